//! Deserializers that accept numbers sent either as JSON numbers or as
//! numeric strings, which is how form-encoded clients post them.

use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Int(i64),
    Float(f64),
    Text(String),
}

fn into_f64(value: Option<NumberOrString>) -> Option<f64> {
    let parsed = match value? {
        NumberOrString::Int(i) => Some(i as f64),
        NumberOrString::Float(f) => Some(f),
        NumberOrString::Text(s) => s.trim().parse::<f64>().ok(),
    };
    parsed.filter(|f| f.is_finite())
}

fn into_i64(value: Option<NumberOrString>) -> Option<i64> {
    match value? {
        NumberOrString::Int(i) => Some(i),
        NumberOrString::Float(f) if f.fract() == 0.0 => Some(f as i64),
        NumberOrString::Float(_) => None,
        NumberOrString::Text(s) => s.trim().parse::<i64>().ok(),
    }
}

/// Optional float; unparsable text reads as absent
pub fn opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(into_f64(Option::<NumberOrString>::deserialize(deserializer)?))
}

/// Optional integer; unparsable text reads as absent
pub fn opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(into_i64(Option::<NumberOrString>::deserialize(deserializer)?))
}

/// Optional 32-bit integer; out-of-range values read as absent
pub fn opt_i32<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(into_i64(Option::<NumberOrString>::deserialize(deserializer)?)
        .and_then(|v| i32::try_from(v).ok()))
}

/// Parse a form field the same way the JSON helpers do
pub fn parse_f64(s: &str) -> Option<f64> {
    into_f64(Some(NumberOrString::Text(s.to_owned())))
}

/// Parse a form field the same way the JSON helpers do
pub fn parse_i64(s: &str) -> Option<i64> {
    into_i64(Some(NumberOrString::Text(s.to_owned())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Fields {
        #[serde(default, deserialize_with = "opt_i64")]
        id: Option<i64>,
        #[serde(default, deserialize_with = "opt_f64")]
        ratio: Option<f64>,
        #[serde(default, deserialize_with = "opt_i32")]
        blur: Option<i32>,
    }

    fn fields(json: &str) -> Fields {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn accepts_numbers_and_strings() {
        let p = fields(r#"{"id": "42", "ratio": "0.5", "blur": 5}"#);
        assert_eq!(p.id, Some(42));
        assert_eq!(p.ratio, Some(0.5));
        assert_eq!(p.blur, Some(5));
    }

    #[test]
    fn garbage_reads_as_absent() {
        let p = fields(r#"{"id": "abc", "ratio": "", "blur": null}"#);
        assert_eq!(p.id, None);
        assert_eq!(p.ratio, None);
        assert_eq!(p.blur, None);
    }

    #[test]
    fn missing_fields_are_absent() {
        let p = fields("{}");
        assert!(p.id.is_none() && p.ratio.is_none() && p.blur.is_none());
    }

    #[test]
    fn fractional_ids_rejected() {
        assert_eq!(fields(r#"{"id": 1.5}"#).id, None);
        assert_eq!(fields(r#"{"id": 3.0}"#).id, Some(3));
    }

    #[test]
    fn blur_out_of_i32_range_is_absent() {
        assert_eq!(fields(r#"{"blur": 99999999999}"#).blur, None);
    }

    #[test]
    fn form_parsing() {
        assert_eq!(parse_f64(" 12.5 "), Some(12.5));
        assert_eq!(parse_f64("NaN"), None);
        assert_eq!(parse_i64("7"), Some(7));
        assert_eq!(parse_i64("x"), None);
    }
}
