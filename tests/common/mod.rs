//! A minimal TrueType font built in memory, so that the tests don't depend on the fonts of the system.
//!
//! The font only has the tables needed to map characters to glyphs and to measure them: every covered
//! character gets its own glyph, half an em wide for ASCII and a full em wide for everything else.

#![allow(dead_code)]

use std::sync::{Arc, OnceLock};

use jobdocs::{Font, GeneratorConfiguration};

const UNITS_PER_EM: u16 = 1000;

/// The characters covered by the test font: ASCII, the yen sign, the ellipsis, CJK punctuation
/// with the kana, the unified ideographs and the full-width forms.
pub const COVERED_RANGES: [(u32, u32); 6] = [
    (0x0020, 0x007E),
    (0x00A5, 0x00A5),
    (0x2026, 0x2026),
    (0x3000, 0x30FF),
    (0x4E00, 0x9FFF),
    (0xFF00, 0xFFEF),
];

static DOCUMENT_FONT: OnceLock<Arc<Font>> = OnceLock::new();

/// The font shared by every test of a test binary.
pub fn document_font() -> Arc<Font> {
    Arc::clone(DOCUMENT_FONT.get_or_init(|| {
        Arc::new(Font::from_bytes(build_font(&COVERED_RANGES)).expect("The test font is invalid"))
    }))
}

/// The test font with a hole where the given character is.
pub fn font_without(character: char) -> Arc<Font> {
    let codepoint = character as u32;
    let mut ranges = Vec::new();
    for (start, end) in COVERED_RANGES {
        if (start..=end).contains(&codepoint) {
            if start < codepoint {
                ranges.push((start, codepoint - 1));
            }
            if codepoint < end {
                ranges.push((codepoint + 1, end));
            }
        } else {
            ranges.push((start, end));
        }
    }

    Arc::new(Font::from_bytes(build_font(&ranges)).expect("The test font is invalid"))
}

pub fn configuration() -> GeneratorConfiguration {
    GeneratorConfiguration::with_font_file_path("tests/fonts/unused.ttf")
}

/// Builds the bytes of a TrueType font with a glyph for every character of the given inclusive ranges.
pub fn build_font(ranges: &[(u32, u32)]) -> Vec<u8> {
    // The glyph 0 is the one for missing characters
    let mut advances = vec![UNITS_PER_EM / 2];
    let mut groups = Vec::new();
    for &(start, end) in ranges {
        groups.push((start, end, advances.len() as u32));
        for codepoint in start..=end {
            advances.push(if codepoint < 0x80 {
                UNITS_PER_EM / 2
            } else {
                UNITS_PER_EM
            });
        }
    }
    let glyph_count = advances.len() as u16;

    // A single Windows Unicode full repertoire subtable in the format 12
    let mut cmap = Vec::new();
    push_u16(&mut cmap, 0);
    push_u16(&mut cmap, 1);
    push_u16(&mut cmap, 3);
    push_u16(&mut cmap, 10);
    push_u32(&mut cmap, 12);
    push_u16(&mut cmap, 12);
    push_u16(&mut cmap, 0);
    push_u32(&mut cmap, 16 + 12 * groups.len() as u32);
    push_u32(&mut cmap, 0);
    push_u32(&mut cmap, groups.len() as u32);
    for (start, end, start_glyph_id) in groups {
        push_u32(&mut cmap, start);
        push_u32(&mut cmap, end);
        push_u32(&mut cmap, start_glyph_id);
    }

    let mut head = Vec::new();
    push_u32(&mut head, 0x0001_0000);
    push_u32(&mut head, 0x0001_0000);
    push_u32(&mut head, 0);
    push_u32(&mut head, 0x5F0F_3CF5);
    push_u16(&mut head, 0);
    push_u16(&mut head, UNITS_PER_EM);
    head.extend_from_slice(&[0; 16]);
    for bound in [0_i16, -120, 1000, 880] {
        push_u16(&mut head, bound as u16);
    }
    push_u16(&mut head, 0);
    push_u16(&mut head, 8);
    push_u16(&mut head, 2);
    push_u16(&mut head, 0);
    push_u16(&mut head, 0);
    assert_eq!(head.len(), 54);

    let mut hhea = Vec::new();
    push_u32(&mut hhea, 0x0001_0000);
    push_u16(&mut hhea, 880);
    push_u16(&mut hhea, -120_i16 as u16);
    push_u16(&mut hhea, 0);
    push_u16(&mut hhea, UNITS_PER_EM);
    hhea.extend_from_slice(&[0; 22]);
    push_u16(&mut hhea, glyph_count);
    assert_eq!(hhea.len(), 36);

    let mut hmtx = Vec::new();
    for advance in advances {
        push_u16(&mut hmtx, advance);
        push_u16(&mut hmtx, 0);
    }

    let mut maxp = Vec::new();
    push_u32(&mut maxp, 0x0000_5000);
    push_u16(&mut maxp, glyph_count);

    // The table records have to be sorted by tag
    let tables: [(&[u8; 4], Vec<u8>); 5] = [
        (b"cmap", cmap),
        (b"head", head),
        (b"hhea", hhea),
        (b"hmtx", hmtx),
        (b"maxp", maxp),
    ];

    let mut font = Vec::new();
    push_u32(&mut font, 0x0001_0000);
    push_u16(&mut font, tables.len() as u16);
    push_u16(&mut font, 64);
    push_u16(&mut font, 2);
    push_u16(&mut font, tables.len() as u16 * 16 - 64);

    let mut offset = 12 + 16 * tables.len() as u32;
    for (tag, data) in tables.iter() {
        font.extend_from_slice(*tag);
        push_u32(&mut font, 0);
        push_u32(&mut font, offset);
        push_u32(&mut font, data.len() as u32);
        offset += padded_length(data.len()) as u32;
    }
    for (_, data) in tables.iter() {
        font.extend_from_slice(data);
        font.resize(font.len() + padded_length(data.len()) - data.len(), 0);
    }

    font
}

fn padded_length(length: usize) -> usize {
    (length + 3) / 4 * 4
}

fn push_u16(buffer: &mut Vec<u8>, value: u16) {
    buffer.extend_from_slice(&value.to_be_bytes());
}

fn push_u32(buffer: &mut Vec<u8>, value: u32) {
    buffer.extend_from_slice(&value.to_be_bytes());
}
