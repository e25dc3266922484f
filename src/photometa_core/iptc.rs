//! IPTC IIM parsing from the Photoshop resource block of a JPEG.
//!
//! Layout: JPEG APP13 segment → `Photoshop 3.0\0` → `8BIM` resources →
//! resource 0x0404 → IIM datasets (`0x1C`, record, dataset, u16 length).
//! Only record 2 (application record) is read.

use crate::photometa_core::photo::IptcRecord;

const APP13: u8 = 0xED;
const SOS: u8 = 0xDA;
const EOI: u8 = 0xD9;
const PHOTOSHOP_SIGNATURE: &[u8] = b"Photoshop 3.0\0";
const RESOURCE_SIGNATURE: &[u8] = b"8BIM";
const IPTC_RESOURCE_ID: u16 = 0x0404;
const IIM_TAG_MARKER: u8 = 0x1C;
const APPLICATION_RECORD: u8 = 2;

/// Application record dataset numbers.
mod dataset {
    pub const OBJECT_NAME: u8 = 5;
    pub const EDIT_STATUS: u8 = 7;
    pub const URGENCY: u8 = 10;
    pub const CATEGORY: u8 = 15;
    pub const SUPPLEMENTAL_CATEGORY: u8 = 20;
    pub const KEYWORDS: u8 = 25;
    pub const RELEASE_DATE: u8 = 30;
    pub const RELEASE_TIME: u8 = 35;
    pub const EXPIRATION_DATE: u8 = 37;
    pub const EXPIRATION_TIME: u8 = 38;
    pub const SPECIAL_INSTRUCTIONS: u8 = 40;
    pub const DATE_CREATED: u8 = 55;
    pub const TIME_CREATED: u8 = 60;
    pub const DIGITAL_CREATION_DATE: u8 = 62;
    pub const DIGITAL_CREATION_TIME: u8 = 63;
    pub const ORIGINATING_PROGRAM: u8 = 65;
    pub const PROGRAM_VERSION: u8 = 70;
    pub const OBJECT_CYCLE: u8 = 75;
    pub const BYLINE: u8 = 80;
    pub const BYLINE_TITLE: u8 = 85;
    pub const CITY: u8 = 90;
    pub const SUB_LOCATION: u8 = 92;
    pub const PROVINCE_STATE: u8 = 95;
    pub const COUNTRY_CODE: u8 = 100;
    pub const COUNTRY_NAME: u8 = 101;
    pub const ORIGINAL_TRANSMISSION_REFERENCE: u8 = 103;
    pub const HEADLINE: u8 = 105;
    pub const CREDIT: u8 = 110;
    pub const SOURCE: u8 = 115;
    pub const COPYRIGHT_NOTICE: u8 = 116;
    pub const CONTACT: u8 = 118;
    pub const CAPTION_ABSTRACT: u8 = 120;
    pub const WRITER_EDITOR: u8 = 122;
    pub const LANGUAGE_IDENTIFIER: u8 = 135;
}

fn read_u16(bytes: &[u8], pos: usize) -> Option<u16> {
    let b = bytes.get(pos..pos + 2)?;
    Some(u16::from_be_bytes([b[0], b[1]]))
}

fn read_u32(bytes: &[u8], pos: usize) -> Option<u32> {
    let b = bytes.get(pos..pos + 4)?;
    Some(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

/// Payloads of every APP13 segment before the start of scan.
fn app13_segments(bytes: &[u8]) -> Vec<&[u8]> {
    let mut segments = Vec::new();
    if !bytes.starts_with(&[0xFF, 0xD8]) {
        return segments;
    }

    let mut pos = 2;
    while pos + 1 < bytes.len() {
        if bytes[pos] != 0xFF {
            log::debug!("Lost JPEG marker sync at offset {}", pos);
            break;
        }
        let marker = bytes[pos + 1];
        pos += 2;

        match marker {
            0xFF => {
                // Fill byte
                pos -= 1;
                continue;
            }
            SOS | EOI => break,
            0x01 | 0xD0..=0xD7 => continue,
            _ => {}
        }

        let Some(len) = read_u16(bytes, pos).map(usize::from) else {
            break;
        };
        if len < 2 {
            break;
        }
        let Some(payload) = bytes.get(pos + 2..pos + len) else {
            break;
        };
        if marker == APP13 {
            segments.push(payload);
        }
        pos += len;
    }

    segments
}

/// Data of the IPTC resource inside a Photoshop APP13 payload.
fn iptc_resource(segment: &[u8]) -> Option<&[u8]> {
    let mut pos = PHOTOSHOP_SIGNATURE.len();
    if !segment.starts_with(PHOTOSHOP_SIGNATURE) {
        return None;
    }

    while pos < segment.len() {
        if segment.get(pos..pos + 4)? != RESOURCE_SIGNATURE {
            return None;
        }
        let id = read_u16(segment, pos + 4)?;
        pos += 6;

        // Pascal name, padded to an even length including the length byte
        let name_len = usize::from(*segment.get(pos)?);
        pos += name_len + 1;
        pos += pos % 2;

        let size = read_u32(segment, pos)? as usize;
        pos += 4;
        let data = segment.get(pos..pos.checked_add(size)?)?;

        if id == IPTC_RESOURCE_ID {
            return Some(data);
        }
        pos += size + size % 2;
    }

    None
}

/// `(dataset, value)` pairs of the application record.
fn application_datasets(data: &[u8]) -> Vec<(u8, String)> {
    let mut datasets = Vec::new();
    let mut pos = 0;

    while pos + 5 <= data.len() {
        if data[pos] != IIM_TAG_MARKER {
            break;
        }
        let record = data[pos + 1];
        let number = data[pos + 2];
        let Some(len) = read_u16(data, pos + 3) else {
            break;
        };
        // Extended datasets (high bit set) are not used by the application record
        if len & 0x8000 != 0 {
            log::debug!("Skipping extended IIM dataset {}:{}", record, number);
            break;
        }
        pos += 5;

        let Some(value) = data.get(pos..pos + usize::from(len)) else {
            break;
        };
        if record == APPLICATION_RECORD {
            let text = String::from_utf8_lossy(value)
                .trim_end_matches('\0')
                .trim()
                .to_string();
            if !text.is_empty() {
                datasets.push((number, text));
            }
        }
        pos += usize::from(len);
    }

    datasets
}

fn build_record(datasets: Vec<(u8, String)>) -> IptcRecord {
    let mut record = IptcRecord::default();
    let mut keywords = Vec::new();
    let mut supplemental = Vec::new();
    let mut country_name = None;

    for (number, value) in datasets {
        let slot = match number {
            dataset::KEYWORDS => {
                keywords.push(value);
                continue;
            }
            dataset::SUPPLEMENTAL_CATEGORY => {
                supplemental.push(value);
                continue;
            }
            dataset::COUNTRY_NAME => {
                country_name = Some(value.clone());
                &mut record.country_primary_location_name
            }
            dataset::OBJECT_NAME => &mut record.object_name,
            dataset::EDIT_STATUS => &mut record.edit_status,
            dataset::URGENCY => &mut record.urgency,
            dataset::CATEGORY => &mut record.category,
            dataset::RELEASE_DATE => &mut record.release_date,
            dataset::RELEASE_TIME => &mut record.release_time,
            dataset::EXPIRATION_DATE => &mut record.expiration_date,
            dataset::EXPIRATION_TIME => &mut record.expiration_time,
            dataset::SPECIAL_INSTRUCTIONS => &mut record.special_instructions,
            dataset::DATE_CREATED => &mut record.date_created,
            dataset::TIME_CREATED => &mut record.time_created,
            dataset::DIGITAL_CREATION_DATE => &mut record.digital_creation_date,
            dataset::DIGITAL_CREATION_TIME => &mut record.digital_creation_time,
            dataset::ORIGINATING_PROGRAM => &mut record.originating_program,
            dataset::PROGRAM_VERSION => &mut record.program_version,
            dataset::OBJECT_CYCLE => &mut record.object_cycle,
            dataset::BYLINE => &mut record.byline,
            dataset::BYLINE_TITLE => &mut record.byline_title,
            dataset::CITY => &mut record.city,
            dataset::SUB_LOCATION => &mut record.sub_location,
            dataset::PROVINCE_STATE => &mut record.province_state,
            dataset::COUNTRY_CODE => &mut record.country_primary_location_code,
            dataset::ORIGINAL_TRANSMISSION_REFERENCE => {
                &mut record.original_transmission_reference
            }
            dataset::HEADLINE => &mut record.headline,
            dataset::CREDIT => &mut record.credit,
            dataset::SOURCE => &mut record.source,
            dataset::COPYRIGHT_NOTICE => &mut record.copyright,
            dataset::CONTACT => &mut record.contact,
            dataset::CAPTION_ABSTRACT => &mut record.caption,
            dataset::WRITER_EDITOR => &mut record.writer_editor,
            dataset::LANGUAGE_IDENTIFIER => &mut record.language_identifier,
            _ => continue,
        };
        // Non-repeatable datasets: first occurrence wins
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    if record.caption.is_none() {
        record.caption = record.object_name.clone();
    }
    record.creator = record.byline.clone();
    record.location = record
        .sub_location
        .clone()
        .or_else(|| record.city.clone())
        .or(country_name);
    record.subcategory = supplemental.first().cloned();

    if !keywords.is_empty() {
        record.keywords = Some(keywords);
    }
    if !supplemental.is_empty() {
        record.supplemental_categories = Some(supplemental);
    }

    record
}

/// Extract the IPTC record. Returns an empty record when the bytes are not a
/// JPEG or carry no IPTC block.
pub fn parse_iptc(bytes: &[u8]) -> IptcRecord {
    let datasets: Vec<(u8, String)> = app13_segments(bytes)
        .into_iter()
        .filter_map(iptc_resource)
        .flat_map(application_datasets)
        .collect();

    if datasets.is_empty() {
        return IptcRecord::default();
    }
    build_record(datasets)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// IIM dataset bytes for record 2.
    pub(crate) fn iim(datasets: &[(u8, &str)]) -> Vec<u8> {
        let mut out = Vec::new();
        for (number, value) in datasets {
            out.extend_from_slice(&[IIM_TAG_MARKER, APPLICATION_RECORD, *number]);
            out.extend_from_slice(&(value.len() as u16).to_be_bytes());
            out.extend_from_slice(value.as_bytes());
        }
        out
    }

    /// A minimal JPEG whose only segment is an APP13 Photoshop block.
    pub(crate) fn jpeg_with_iptc(datasets: &[(u8, &str)]) -> Vec<u8> {
        let data = iim(datasets);

        let mut resource = PHOTOSHOP_SIGNATURE.to_vec();
        resource.extend_from_slice(RESOURCE_SIGNATURE);
        resource.extend_from_slice(&IPTC_RESOURCE_ID.to_be_bytes());
        resource.extend_from_slice(&[0, 0]);
        resource.extend_from_slice(&(data.len() as u32).to_be_bytes());
        resource.extend_from_slice(&data);
        if data.len() % 2 == 1 {
            resource.push(0);
        }

        let mut jpeg = vec![0xFF, 0xD8, 0xFF, APP13];
        jpeg.extend_from_slice(&((resource.len() + 2) as u16).to_be_bytes());
        jpeg.extend_from_slice(&resource);
        jpeg.extend_from_slice(&[0xFF, EOI]);
        jpeg
    }

    #[test]
    fn test_parse_caption_and_keywords() {
        let jpeg = jpeg_with_iptc(&[
            (dataset::CAPTION_ABSTRACT, "Sunset over the bay"),
            (dataset::KEYWORDS, "sunset"),
            (dataset::KEYWORDS, "ocean"),
            (dataset::BYLINE, "Jane Doe"),
            (dataset::COPYRIGHT_NOTICE, "(c) 2024 Jane Doe"),
            (dataset::CATEGORY, "Landscape"),
        ]);

        let record = parse_iptc(&jpeg);
        assert_eq!(record.caption.as_deref(), Some("Sunset over the bay"));
        assert_eq!(
            record.keywords,
            Some(vec!["sunset".to_string(), "ocean".to_string()])
        );
        assert_eq!(record.creator.as_deref(), Some("Jane Doe"));
        assert_eq!(record.byline.as_deref(), Some("Jane Doe"));
        assert_eq!(record.copyright.as_deref(), Some("(c) 2024 Jane Doe"));
        assert_eq!(record.category.as_deref(), Some("Landscape"));
    }

    #[test]
    fn test_caption_falls_back_to_object_name() {
        let jpeg = jpeg_with_iptc(&[(dataset::OBJECT_NAME, "IMG_0042")]);
        let record = parse_iptc(&jpeg);
        assert_eq!(record.caption.as_deref(), Some("IMG_0042"));
    }

    #[test]
    fn test_location_precedence() {
        let jpeg = jpeg_with_iptc(&[
            (dataset::COUNTRY_NAME, "France"),
            (dataset::CITY, "Paris"),
        ]);
        assert_eq!(parse_iptc(&jpeg).location.as_deref(), Some("Paris"));

        let jpeg = jpeg_with_iptc(&[
            (dataset::COUNTRY_NAME, "France"),
            (dataset::CITY, "Paris"),
            (dataset::SUB_LOCATION, "Montmartre"),
        ]);
        assert_eq!(parse_iptc(&jpeg).location.as_deref(), Some("Montmartre"));

        let jpeg = jpeg_with_iptc(&[(dataset::COUNTRY_NAME, "France")]);
        let record = parse_iptc(&jpeg);
        assert_eq!(record.location.as_deref(), Some("France"));
        assert_eq!(record.country_primary_location_name.as_deref(), Some("France"));
    }

    #[test]
    fn test_no_iptc_yields_empty_record() {
        assert!(parse_iptc(&[]).is_empty());
        assert!(parse_iptc(b"\x89PNG\r\n\x1a\n").is_empty());
        assert!(parse_iptc(&[0xFF, 0xD8, 0xFF, 0xD9]).is_empty());
    }

    #[test]
    fn test_truncated_block_does_not_panic() {
        let jpeg = jpeg_with_iptc(&[(dataset::HEADLINE, "Breaking")]);
        for cut in 0..jpeg.len() {
            let _ = parse_iptc(&jpeg[..cut]);
        }
    }

    #[test]
    fn test_supplemental_categories() {
        let jpeg = jpeg_with_iptc(&[
            (dataset::SUPPLEMENTAL_CATEGORY, "Travel"),
            (dataset::SUPPLEMENTAL_CATEGORY, "Europe"),
        ]);
        let record = parse_iptc(&jpeg);
        assert_eq!(record.subcategory.as_deref(), Some("Travel"));
        assert_eq!(
            record.supplemental_categories,
            Some(vec!["Travel".to_string(), "Europe".to_string()])
        );
    }
}
