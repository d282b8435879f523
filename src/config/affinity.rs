//! CPU affinity notation
//!
//! The rule editor writes affinity as a compact string (`"0-3"`, `"0;2;4"`,
//! `"1;3-5"`); the rule file may also carry an explicit list. Both are
//! normalized to a sorted, de-duplicated core list before the engine sees them.

use crate::error::ConfigError;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use std::collections::BTreeSet;

/// Parse an affinity string into core indices
pub fn parse_affinity(value: &str) -> Result<Vec<usize>, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidAffinity {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let mut cores = BTreeSet::new();

    for part in value.split(';').map(str::trim) {
        if part.is_empty() {
            return Err(invalid("empty core entry"));
        }

        match part.split_once('-') {
            Some((start, end)) => {
                let start: usize = start
                    .trim()
                    .parse()
                    .map_err(|_| invalid("range start is not a core index"))?;
                let end: usize = end
                    .trim()
                    .parse()
                    .map_err(|_| invalid("range end is not a core index"))?;
                if start > end {
                    return Err(invalid("range start is greater than its end"));
                }
                cores.extend(start..=end);
            }
            None => {
                let core: usize = part.parse().map_err(|_| invalid("not a core index"))?;
                cores.insert(core);
            }
        }
    }

    Ok(cores.into_iter().collect())
}

/// Format core indices back to the compact editor notation
pub fn format_affinity(cores: &[usize]) -> String {
    let mut sorted: Vec<usize> = cores.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut parts = Vec::new();
    let mut iter = sorted.into_iter().peekable();

    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end += 1;
            iter.next();
        }
        if start == end {
            parts.push(start.to_string());
        } else {
            parts.push(format!("{}-{}", start, end));
        }
    }

    parts.join(";")
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AffinityRepr {
    List(Vec<usize>),
    Text(String),
}

/// Serde adapter for `Rule::affinity`
pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<usize>>, D::Error>
where
    D: Deserializer<'de>,
{
    let repr = Option::<AffinityRepr>::deserialize(deserializer)?;

    let cores = match repr {
        None => return Ok(None),
        Some(AffinityRepr::List(list)) => {
            let set: BTreeSet<usize> = list.into_iter().collect();
            set.into_iter().collect::<Vec<_>>()
        }
        Some(AffinityRepr::Text(text)) if text.trim().is_empty() => return Ok(None),
        Some(AffinityRepr::Text(text)) => parse_affinity(&text).map_err(de::Error::custom)?,
    };

    Ok(if cores.is_empty() { None } else { Some(cores) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_affinity("0-3").unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse_affinity("0;2;4").unwrap(), vec![0, 2, 4]);
    }

    #[test]
    fn test_parse_mixed_and_unsorted() {
        assert_eq!(parse_affinity("1;3-5").unwrap(), vec![1, 3, 4, 5]);
        assert_eq!(parse_affinity("5; 1 ;1").unwrap(), vec![1, 5]);
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        assert!(parse_affinity("").is_err());
        assert!(parse_affinity("a").is_err());
        assert!(parse_affinity("3-1").is_err());
        assert!(parse_affinity("1;;2").is_err());
        assert!(parse_affinity("-2").is_err());
    }

    #[test]
    fn test_format_compacts_runs() {
        assert_eq!(format_affinity(&[0, 1, 2, 3]), "0-3");
        assert_eq!(format_affinity(&[4, 0, 2]), "0;2;4");
        assert_eq!(format_affinity(&[1, 3, 4, 5]), "1;3-5");
        assert_eq!(format_affinity(&[]), "");
    }

    #[derive(Deserialize)]
    struct Holder {
        #[serde(default, deserialize_with = "deserialize")]
        affinity: Option<Vec<usize>>,
    }

    #[test]
    fn test_deserialize_accepts_both_forms() {
        let holder: Holder = serde_json::from_str(r#"{"affinity": [3, 1, 1]}"#).unwrap();
        assert_eq!(holder.affinity, Some(vec![1, 3]));

        let holder: Holder = serde_json::from_str(r#"{"affinity": "1;3-5"}"#).unwrap();
        assert_eq!(holder.affinity, Some(vec![1, 3, 4, 5]));

        let holder: Holder = serde_json::from_str(r#"{"affinity": "  "}"#).unwrap();
        assert_eq!(holder.affinity, None);

        let holder: Holder = serde_json::from_str(r#"{"affinity": null}"#).unwrap();
        assert_eq!(holder.affinity, None);

        let holder: Holder = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(holder.affinity, None);

        assert!(serde_json::from_str::<Holder>(r#"{"affinity": "2-1"}"#).is_err());
    }
}
