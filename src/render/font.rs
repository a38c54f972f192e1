use std::path::Path;

use ab_glyph::FontArc;

const SYSTEM_FONT_CANDIDATES: [&str; 7] = [
    "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/System/Library/Fonts/SFNS.ttf",
    "/System/Library/Fonts/Supplemental/Helvetica.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
];

/// Loads the configured font, falling back to well-known system locations.
pub fn load_font(preferred: Option<&Path>) -> Option<FontArc> {
    if let Some(path) = preferred {
        match read_font(path) {
            Some(font) => return Some(font),
            None => log::warn!(
                "configured font {} is unusable; trying system fonts",
                path.display()
            ),
        }
    }

    for path in SYSTEM_FONT_CANDIDATES {
        if let Some(font) = read_font(Path::new(path)) {
            log::debug!("using system font {path}");
            return Some(font);
        }
    }

    log::warn!("no usable font found; result labels will not be drawn");
    None
}

fn read_font(path: &Path) -> Option<FontArc> {
    let bytes = std::fs::read(path).ok()?;
    FontArc::try_from_vec(bytes).ok()
}
