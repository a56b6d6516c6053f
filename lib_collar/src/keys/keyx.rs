//! Streaming parse of `.keyx` documents with quick-xml.
//!
//! Expected shape (extra elements are ignored):
//!
//! ```xml
//! <collarKeys>
//!   <collar ID="12345">
//!     <key>9F1A2B...</key>
//!   </collar>
//! </collarKeys>
//! ```

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::KeyRecord;
use crate::errors::{CollarError, Result};

/// Parses the text of one key file. `origin` labels errors (usually the path).
///
/// Exactly one `collar` element with an `ID` attribute and exactly one
/// non-empty `key` element are required.
pub fn parse_key_str(xml: &str, origin: &str) -> Result<KeyRecord> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut device_ids: Vec<String> = Vec::new();
    let mut keys: Vec<String> = Vec::new();
    let mut in_key = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"collar" => device_ids.push(collar_id(&e, origin)?),
                b"key" => {
                    in_key = true;
                    keys.push(String::new());
                }
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"collar" => {
                device_ids.push(collar_id(&e, origin)?);
            }
            Ok(Event::Text(t)) if in_key => {
                let text = t.unescape().map_err(|e| CollarError::parse(origin, e))?;
                if let Some(current) = keys.last_mut() {
                    current.push_str(text.trim());
                }
            }
            Ok(Event::CData(c)) if in_key => {
                let raw = c.into_inner();
                let text = String::from_utf8_lossy(&raw);
                if let Some(current) = keys.last_mut() {
                    current.push_str(text.trim());
                }
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"key" => in_key = false,
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(CollarError::parse(
                    origin,
                    format!("malformed XML at byte {}: {}", reader.buffer_position(), e),
                ))
            }
        }
    }

    let device_id = exactly_one(device_ids, "collar ID", origin)?;
    let credential = exactly_one(keys, "key", origin)?;

    Ok(KeyRecord {
        device_id,
        credential,
    })
}

fn collar_id(element: &BytesStart<'_>, origin: &str) -> Result<String> {
    let attr = element
        .try_get_attribute("ID")
        .map_err(|e| CollarError::parse(origin, e))?
        .ok_or_else(|| CollarError::parse(origin, "collar element without ID attribute"))?;
    let value = attr
        .unescape_value()
        .map_err(|e| CollarError::parse(origin, e))?;
    Ok(value.trim().to_string())
}

fn exactly_one(values: Vec<String>, what: &str, origin: &str) -> Result<String> {
    let mut values: Vec<String> = values.into_iter().filter(|v| !v.is_empty()).collect();
    match values.len() {
        1 => Ok(values.remove(0)),
        0 => Err(CollarError::parse(origin, format!("no {} found", what))),
        n => Err(CollarError::parse(origin, format!("expected one {}, found {}", what, n))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_id_and_key() {
        let xml = r#"<collarKeys><collar ID=" 4711 "><key>
            ABCDEF0123
        </key></collar></collarKeys>"#;
        let record = parse_key_str(xml, "test").unwrap();
        assert_eq!(record.device_id, "4711");
        assert_eq!(record.credential, "ABCDEF0123");
    }

    #[test]
    fn missing_key_is_a_parse_error() {
        let xml = r#"<collarKeys><collar ID="1"></collar></collarKeys>"#;
        let err = parse_key_str(xml, "k.keyx").unwrap_err();
        assert!(matches!(err, CollarError::Parse { ref origin, .. } if origin == "k.keyx"));
    }

    #[test]
    fn missing_id_is_a_parse_error() {
        let xml = r#"<collarKeys><collar><key>AB</key></collar></collarKeys>"#;
        assert!(parse_key_str(xml, "k").is_err());
    }

    #[test]
    fn two_collars_in_one_file_are_rejected() {
        let xml = r#"<collarKeys>
            <collar ID="1"><key>A</key></collar>
            <collar ID="2"><key>B</key></collar>
        </collarKeys>"#;
        assert!(parse_key_str(xml, "k").is_err());
    }

    #[test]
    fn not_xml_at_all_fails() {
        assert!(parse_key_str("this is not a key", "k").is_err());
    }
}
