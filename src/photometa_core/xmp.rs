//! XMP packet parsing.
//!
//! The packet is located in the raw bytes and read as text. Properties are
//! collected from the three RDF/XML shapes writers use in practice:
//! attributes on `rdf:Description`, simple elements, and `rdf:Bag/Seq/Alt`
//! lists. Anything else is dropped.

use crate::photometa_core::photo::XmpRecord;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

const CAMERA_RAW_PREFIX: &str = "crs:";

struct XmpPatterns {
    packet: regex::bytes::Regex,
    attribute: Regex,
    element: Regex,
    list: Regex,
    list_item: Regex,
}

impl XmpPatterns {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            packet: regex::bytes::Regex::new(r"(?s)<x:xmpmeta.*?</x:xmpmeta>")?,
            attribute: Regex::new(r#"([A-Za-z][\w.-]*:[A-Za-z][\w.-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)?,
            element: Regex::new(r"<([\w-]+:[\w-]+)(?:\s[^>]*[^/])?>([^<]*)</([\w-]+:[\w-]+)>")?,
            list: Regex::new(
                r"(?s)<([\w-]+:[\w-]+)(?:\s[^>]*)?>\s*<rdf:(?:Bag|Seq|Alt)[^>]*>(.*?)</rdf:(?:Bag|Seq|Alt)>\s*</([\w-]+:[\w-]+)>",
            )?,
            list_item: Regex::new(r"(?s)<rdf:li[^>]*>(.*?)</rdf:li>")?,
        })
    }
}

static PATTERNS: LazyLock<Result<XmpPatterns, regex::Error>> = LazyLock::new(XmpPatterns::new);

/// Replace the predefined XML entities and numeric character references.
fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let Some(end) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };

        let entity = &tail[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };

        match decoded {
            Some(c) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Every property found in the packet, in document order.
fn collect_properties(patterns: &XmpPatterns, packet: &str) -> HashMap<String, Vec<String>> {
    let mut properties: HashMap<String, Vec<String>> = HashMap::new();

    for caps in patterns.list.captures_iter(packet) {
        if caps[1] != caps[3] {
            continue;
        }
        let items: Vec<String> = patterns
            .list_item
            .captures_iter(&caps[2])
            .map(|item| decode_entities(item[1].trim()))
            .filter(|item| !item.is_empty())
            .collect();
        properties.entry(caps[1].to_string()).or_default().extend(items);
    }

    for caps in patterns.element.captures_iter(packet) {
        if caps[1] != caps[3] || caps[1].starts_with("rdf:") {
            continue;
        }
        let value = decode_entities(caps[2].trim());
        if !value.is_empty() {
            properties.entry(caps[1].to_string()).or_default().push(value);
        }
    }

    for caps in patterns.attribute.captures_iter(packet) {
        let name = &caps[1];
        if name.starts_with("xmlns:") || name.starts_with("rdf:") || name.starts_with("x:") {
            continue;
        }
        let raw = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
        let value = decode_entities(raw.trim());
        if !value.is_empty() {
            properties.entry(name.to_string()).or_default().push(value);
        }
    }

    properties
}

struct Properties(HashMap<String, Vec<String>>);

impl Properties {
    fn first(&self, name: &str) -> Option<String> {
        self.0.get(name).and_then(|values| values.first().cloned())
    }

    fn all(&self, name: &str) -> Option<Vec<String>> {
        self.0.get(name).filter(|values| !values.is_empty()).cloned()
    }

    fn joined(&self, name: &str) -> Option<String> {
        self.all(name).map(|values| values.join(", "))
    }
}

fn parse_rating(value: &str) -> Option<u8> {
    let rating = value.trim().parse::<f64>().ok()?;
    (1.0..=5.0)
        .contains(&rating)
        .then_some(rating.round() as u8)
}

fn split_keywords(value: &str) -> Vec<String> {
    value
        .split([',', ';'])
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

fn build_record(properties: Properties) -> XmpRecord {
    let lightroom_edits: BTreeMap<String, String> = properties
        .0
        .iter()
        .filter_map(|(name, values)| {
            let key = name.strip_prefix(CAMERA_RAW_PREFIX)?;
            Some((key.to_string(), values.first()?.clone()))
        })
        .collect();

    let keywords = properties
        .first("pdf:Keywords")
        .map(|k| split_keywords(&k))
        .filter(|k| !k.is_empty());

    XmpRecord {
        rating: properties.first("xmp:Rating").and_then(|r| parse_rating(&r)),
        label: properties.first("xmp:Label"),
        keywords,
        creator: properties.joined("dc:creator"),
        rights: properties.first("dc:rights"),
        description: properties.first("dc:description"),
        title: properties.first("dc:title"),
        subject: properties.all("dc:subject"),
        create_date: properties.first("xmp:CreateDate"),
        modify_date: properties.first("xmp:ModifyDate"),
        metadata_date: properties.first("xmp:MetadataDate"),
        creator_tool: properties.first("xmp:CreatorTool"),
        usage_terms: properties.first("xmpRights:UsageTerms"),
        web_statement: properties.first("xmpRights:WebStatement"),
        instructions: properties.first("photoshop:Instructions"),
        copyright_status: properties.first("xmpRights:Marked"),
        headline: properties.first("photoshop:Headline"),
        credit: properties.first("photoshop:Credit"),
        city: properties.first("photoshop:City"),
        country: properties.first("photoshop:Country"),
        lightroom_edits,
    }
}

/// Extract the XMP record from the first packet in the bytes. Returns an
/// empty record when there is none.
pub fn parse_xmp(bytes: &[u8]) -> XmpRecord {
    let patterns = match PATTERNS.as_ref() {
        Ok(patterns) => patterns,
        Err(e) => {
            log::error!("XMP patterns failed to compile: {}", e);
            return XmpRecord::default();
        }
    };

    let Some(packet) = patterns.packet.find(bytes) else {
        log::debug!("No XMP packet found");
        return XmpRecord::default();
    };
    let packet = String::from_utf8_lossy(packet.as_bytes());

    build_record(Properties(collect_properties(patterns, &packet)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PACKET: &str = r#"<?xpacket begin="" id="W5M0MpCehiHzreSzNTczkc9d"?>
<x:xmpmeta xmlns:x="adobe:ns:meta/" x:xmptk="XMP Core 6.0">
 <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
  <rdf:Description rdf:about=""
    xmlns:xmp="http://ns.adobe.com/xap/1.0/"
    xmlns:dc="http://purl.org/dc/elements/1.1/"
    xmlns:pdf="http://ns.adobe.com/pdf/1.3/"
    xmlns:photoshop="http://ns.adobe.com/photoshop/1.0/"
    xmlns:crs="http://ns.adobe.com/camera-raw-settings/1.0/"
    xmp:Rating="4"
    xmp:Label="Red"
    xmp:CreatorTool="Adobe Lightroom"
    pdf:Keywords="beach; summer, holiday"
    photoshop:City="Nice"
    crs:Exposure2012="+0.35"
    crs:WhiteBalance="As Shot">
   <dc:creator>
    <rdf:Seq>
     <rdf:li>Jane Doe</rdf:li>
    </rdf:Seq>
   </dc:creator>
   <dc:title>
    <rdf:Alt>
     <rdf:li xml:lang="x-default">Waves &amp; Rocks</rdf:li>
    </rdf:Alt>
   </dc:title>
   <dc:subject>
    <rdf:Bag>
     <rdf:li>Landscape</rdf:li>
     <rdf:li>Sea</rdf:li>
    </rdf:Bag>
   </dc:subject>
   <photoshop:Headline>Morning tide</photoshop:Headline>
  </rdf:Description>
 </rdf:RDF>
</x:xmpmeta>
<?xpacket end="w"?>"#;

    fn embedded(packet: &str) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE1, 0x00, 0x10];
        bytes.extend_from_slice(b"http://ns.adobe.com/xap/1.0/\0");
        bytes.extend_from_slice(packet.as_bytes());
        bytes.extend_from_slice(&[0xFF, 0xD9]);
        bytes
    }

    #[test]
    fn test_parse_packet() {
        let record = parse_xmp(&embedded(PACKET));

        assert_eq!(record.rating, Some(4));
        assert_eq!(record.label.as_deref(), Some("Red"));
        assert_eq!(record.creator_tool.as_deref(), Some("Adobe Lightroom"));
        assert_eq!(
            record.keywords,
            Some(vec![
                "beach".to_string(),
                "summer".to_string(),
                "holiday".to_string()
            ])
        );
        assert_eq!(record.creator.as_deref(), Some("Jane Doe"));
        assert_eq!(record.title.as_deref(), Some("Waves & Rocks"));
        assert_eq!(
            record.subject,
            Some(vec!["Landscape".to_string(), "Sea".to_string()])
        );
        assert_eq!(record.headline.as_deref(), Some("Morning tide"));
        assert_eq!(record.city.as_deref(), Some("Nice"));
        assert_eq!(
            record.lightroom_edits.get("Exposure2012").map(String::as_str),
            Some("+0.35")
        );
        assert_eq!(
            record.lightroom_edits.get("WhiteBalance").map(String::as_str),
            Some("As Shot")
        );
        assert_eq!(record.description, None);
    }

    #[test]
    fn test_no_packet_yields_empty_record() {
        assert!(parse_xmp(b"no metadata here").is_empty());
        assert!(parse_xmp(&[]).is_empty());
    }

    #[test]
    fn test_unterminated_packet_is_ignored() {
        let packet = r#"<x:xmpmeta xmlns:x="adobe:ns:meta/"><rdf:Description xmp:Rating="3">"#;
        assert!(parse_xmp(packet.as_bytes()).is_empty());
    }

    #[test]
    fn test_rating_out_of_range_is_dropped() {
        assert_eq!(parse_rating("5"), Some(5));
        assert_eq!(parse_rating("1"), Some(1));
        assert_eq!(parse_rating("0"), None);
        assert_eq!(parse_rating("-1"), None);
        assert_eq!(parse_rating("6"), None);
        assert_eq!(parse_rating("great"), None);
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("a &amp; b"), "a & b");
        assert_eq!(decode_entities("&lt;tag&gt;"), "<tag>");
        assert_eq!(decode_entities("&#169; 2024"), "\u{a9} 2024");
        assert_eq!(decode_entities("&#xA9;"), "\u{a9}");
        assert_eq!(decode_entities("R&D"), "R&D");
        assert_eq!(decode_entities("&bogus;"), "&bogus;");
    }

    #[test]
    fn test_split_keywords() {
        assert_eq!(split_keywords("a, b;c ;; "), vec!["a", "b", "c"]);
        assert!(split_keywords(" ; ").is_empty());
    }
}
