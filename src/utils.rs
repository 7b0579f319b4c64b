use anyhow::{anyhow, Result};
use std::fmt::Debug;
use std::path::Path;
use std::str::FromStr;

pub fn parse_number<T>(value: &str, name: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Debug,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| anyhow!("Could not parse {} from \"{}\" ({:?})", name, value, e))
}

/// Splits a comma separated CLI value (e.g. `train,valid`) into its trimmed,
/// non-empty parts.
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect()
}

/// Prefix used for every file a dataset contributes to the merged corpus.
pub fn dataset_prefix(dataset_name: &str) -> String {
    dataset_name.replace(' ', "_")
}

pub fn prefixed_file_name(dataset_name: &str, file_name: &str) -> String {
    format!("{}_{}", dataset_prefix(dataset_name), file_name)
}

pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numbers_or_fails_with_name() {
        assert_eq!(parse_number::<f32>(" 0.25 ", "confidence").unwrap(), 0.25);
        assert_eq!(parse_number::<usize>("7", "psm").unwrap(), 7);
        let err = parse_number::<u32>("seven", "psm").unwrap_err();
        assert!(err.to_string().contains("psm"));
    }

    #[test]
    fn splits_lists() {
        assert_eq!(parse_list("train, valid,,test "), vec!["train", "valid", "test"]);
        assert!(parse_list(" , ").is_empty());
    }

    #[test]
    fn prefixes_replace_spaces() {
        assert_eq!(dataset_prefix("Experi Date.v1i.yolov8"), "Experi_Date.v1i.yolov8");
        assert_eq!(
            prefixed_file_name("mrp label.v1i.yolov8", "img_01.txt"),
            "mrp_label.v1i.yolov8_img_01.txt"
        );
    }

    #[test]
    fn matches_extensions_case_insensitively() {
        assert!(has_extension(Path::new("a/b/c.JPG"), &["jpg", "png"]));
        assert!(has_extension(Path::new("c.png"), &["jpg", "png"]));
        assert!(!has_extension(Path::new("c.txt"), &["jpg", "png"]));
        assert!(!has_extension(Path::new("noext"), &["jpg"]));
    }
}
