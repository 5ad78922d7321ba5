use dicom::core::dictionary::DataDictionary;
use dicom::core::value::{PrimitiveValue, Value};
use dicom::core::{Tag, VR};
use dicom::dictionary_std::StandardDataDictionary;

/// Renders a tag as the `gggg|eeee` dictionary key, lower case.
pub fn format_tag(tag: Tag) -> String {
    format!("{:04x}|{:04x}", tag.group(), tag.element())
}

/// Accepts `gggg|eeee`, `gggg,eeee`, `(gggg,eeee)`, `ggggeeee` or a keyword
/// from the standard dictionary such as `SeriesNumber`.
pub fn parse_tag(text: &str) -> Option<Tag> {
    let trimmed = text.trim();
    let bare = trimmed
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .unwrap_or(trimmed);

    let hex_pair = bare
        .split_once(['|', ','])
        .or_else(|| (bare.len() == 8 && bare.is_ascii()).then(|| bare.split_at(4)));
    if let Some((group, element)) = hex_pair {
        if let (Ok(group), Ok(element)) = (
            u16::from_str_radix(group.trim(), 16),
            u16::from_str_radix(element.trim(), 16),
        ) {
            return Some(Tag(group, element));
        }
    }

    StandardDataDictionary.parse_tag(bare)
}

/// Text value of an element as stored, or `None` for sequences and bulk data.
pub fn value_to_string<I, P>(value: &Value<I, P>, vr: VR) -> Option<String> {
    match value {
        Value::Primitive(primitive) => format_primitive_value(primitive, vr),
        Value::Sequence(_) | Value::PixelSequence(_) => None,
    }
}

fn format_primitive_value(value: &PrimitiveValue, vr: VR) -> Option<String> {
    match value {
        PrimitiveValue::Empty => Some(String::new()),
        PrimitiveValue::Tags(values) => Some(
            values
                .iter()
                .map(|tag| format_tag(*tag))
                .collect::<Vec<_>>()
                .join("\\"),
        ),
        _ if is_binary_vr(vr) => None,
        _ => Some(value.to_str().into_owned()),
    }
}

pub fn is_binary_vr(vr: VR) -> bool {
    matches!(
        vr,
        VR::OB | VR::OD | VR::OF | VR::OL | VR::OV | VR::OW | VR::UN
    )
}

/// Formats a float the way report cells show it: shortest round-trip text.
pub fn format_float(value: f64) -> String {
    if value.is_finite() && value == value.trunc() && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

pub fn format_float_list(values: &[f64]) -> String {
    let parts: Vec<String> = values.iter().map(|value| format_float(*value)).collect();
    format!("[{}]", parts.join(", "))
}

pub fn format_usize_list(values: &[usize]) -> String {
    let parts: Vec<String> = values.iter().map(usize::to_string).collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_spellings_agree() {
        let expected = Tag(0x0020, 0x000E);
        for text in ["0020|000e", "0020|000E", "0020,000e", "(0020,000E)", "0020000E"] {
            assert_eq!(parse_tag(text), Some(expected), "{text}");
        }
        assert_eq!(parse_tag("SeriesInstanceUID"), Some(expected));
        assert_eq!(format_tag(expected), "0020|000e");
        assert_eq!(parse_tag("not a tag"), None);
    }

    #[test]
    fn float_cells() {
        assert_eq!(format_float(2.0), "2.0");
        assert_eq!(format_float(0.25), "0.25");
        assert_eq!(format_float_list(&[1.0, -0.5]), "[1.0, -0.5]");
        assert_eq!(format_usize_list(&[512, 512, 1]), "[512, 512, 1]");
    }
}
