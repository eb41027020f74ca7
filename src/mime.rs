//! Mime-type codes and lookup tables.
//!
//! A [`MimeCode`] packs a major content family, a set of dispatch flags, and a
//! serial number into one word. The flags drive the parse dispatcher: they
//! mark formats as raw camera images, markup, PDF-like containers, office
//! documents, archives, and so on. Lookup goes through [`MimeTables`], built
//! once per scan: extension to code, and sniffed essence string to code.

use std::collections::HashMap;

/// Major content family, stored in the high byte of a [`MimeCode`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Major {
    Other = 0,
    Application = 1,
    Audio = 2,
    Image = 3,
    Text = 4,
    Video = 5,
    Font = 6,
}

/// Explicitly excluded from parsing: classified, never decoded.
pub const F_SKIP: u32 = 1 << 8;
/// Raw camera image format.
pub const F_RAW: u32 = 1 << 9;
/// Markup sub-family of text (tags stripped before text extraction).
pub const F_MARKUP: u32 = 1 << 10;
/// PDF-like document container, handled by the ebook decoder.
pub const F_PDF: u32 = 1 << 11;
/// Office / structured-document container.
pub const F_OFFICE: u32 = 1 << 12;
/// Archive container.
pub const F_ARCHIVE: u32 = 1 << 13;
/// Compressed single stream, parsed as an archive only when the filename
/// matches the inclusion policy.
pub const F_ARCHIVE_FILTER: u32 = 1 << 14;
/// Legacy e-book format.
pub const F_MOBI: u32 = 1 << 15;
/// Legacy word-processor format.
pub const F_MSDOC: u32 = 1 << 16;
pub const F_JSON: u32 = 1 << 17;
pub const F_NDJSON: u32 = 1 << 18;
/// Comic-book archive sub-format.
pub const F_COMIC: u32 = 1 << 19;
/// Internal sidecar metadata pseudo-type.
pub const F_SIDECAR: u32 = 1 << 20;

const fn code(major: Major, flags: u32, serial: u32) -> MimeCode {
    MimeCode(((major as u32) << 24) | flags | serial)
}

/// Resolved mime-type code. `MimeCode::UNKNOWN` means classification failed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct MimeCode(u32);

impl MimeCode {
    pub const UNKNOWN: MimeCode = MimeCode(0);
    /// Sentinel for zero-byte files.
    pub const EMPTY: MimeCode = code(Major::Other, 0, 1);
    pub const SIDECAR: MimeCode = code(Major::Application, F_SIDECAR, 40);

    pub fn is_unknown(self) -> bool {
        self == MimeCode::UNKNOWN
    }

    pub fn major(self) -> Major {
        match (self.0 >> 24) & 0xff {
            1 => Major::Application,
            2 => Major::Audio,
            3 => Major::Image,
            4 => Major::Text,
            5 => Major::Video,
            6 => Major::Font,
            _ => Major::Other,
        }
    }

    fn flag(self, f: u32) -> bool {
        self.0 & f != 0
    }

    pub fn is_raw(self) -> bool {
        self.flag(F_RAW)
    }
    pub fn is_markup(self) -> bool {
        self.flag(F_MARKUP)
    }
    pub fn is_pdf(self) -> bool {
        self.flag(F_PDF)
    }
    pub fn is_office(self) -> bool {
        self.flag(F_OFFICE)
    }
    pub fn is_archive(self) -> bool {
        self.flag(F_ARCHIVE)
    }
    pub fn is_archive_filter(self) -> bool {
        self.flag(F_ARCHIVE_FILTER)
    }
    pub fn is_mobi(self) -> bool {
        self.flag(F_MOBI)
    }
    pub fn is_msdoc(self) -> bool {
        self.flag(F_MSDOC)
    }
    pub fn is_json(self) -> bool {
        self.flag(F_JSON)
    }
    pub fn is_ndjson(self) -> bool {
        self.flag(F_NDJSON)
    }
    pub fn is_comic(self) -> bool {
        self.flag(F_COMIC)
    }
    pub fn is_sidecar(self) -> bool {
        self.flag(F_SIDECAR)
    }

    /// False for unknown, empty, and policy-excluded types: no decoder runs.
    pub fn should_parse(self) -> bool {
        !self.is_unknown() && self != MimeCode::EMPTY && !self.flag(F_SKIP)
    }

    /// Canonical mime string for this code.
    pub fn essence(self) -> &'static str {
        TYPES
            .iter()
            .find(|t| t.code == self)
            .map(|t| t.essence)
            .unwrap_or("application/octet-stream")
    }
}

/// One row of the static type table.
pub struct MimeType {
    pub code: MimeCode,
    pub essence: &'static str,
    pub exts: &'static [&'static str],
}

macro_rules! mt {
    ($major:ident, $flags:expr, $serial:expr, $essence:expr, [$($ext:expr),*]) => {
        MimeType {
            code: code(Major::$major, $flags, $serial),
            essence: $essence,
            exts: &[$($ext),*],
        }
    };
}

/// The compiled type table. Serials are unique within each major family.
pub static TYPES: &[MimeType] = &[
    mt!(Other, 0, 1, "application/x-empty", []),
    // Plain text
    mt!(Text, 0, 1, "text/plain", ["txt", "text", "log"]),
    mt!(Text, 0, 2, "text/markdown", ["md", "markdown"]),
    mt!(Text, 0, 3, "text/csv", ["csv"]),
    mt!(Text, 0, 4, "text/tab-separated-values", ["tsv"]),
    mt!(Text, 0, 5, "text/x-ini", ["ini", "cfg", "conf"]),
    mt!(Text, 0, 6, "text/x-yaml", ["yaml", "yml"]),
    mt!(Text, 0, 7, "text/x-toml", ["toml"]),
    mt!(Text, 0, 8, "text/x-rst", ["rst"]),
    mt!(Text, 0, 9, "text/x-tex", ["tex"]),
    mt!(Text, 0, 10, "text/x-shellscript", ["sh", "bash", "zsh"]),
    mt!(Text, 0, 11, "text/x-python", ["py"]),
    mt!(Text, 0, 12, "text/x-rust", ["rs"]),
    mt!(Text, 0, 13, "text/x-c", ["c", "h"]),
    mt!(Text, 0, 14, "text/x-c++", ["cpp", "cc", "hpp"]),
    mt!(Text, 0, 15, "text/javascript", ["js", "mjs"]),
    mt!(Text, 0, 16, "text/x-typescript", ["ts", "tsx"]),
    mt!(Text, 0, 17, "text/x-java", ["java"]),
    mt!(Text, 0, 18, "text/x-go", ["go"]),
    mt!(Text, 0, 19, "text/x-ruby", ["rb"]),
    mt!(Text, 0, 20, "text/x-php", ["php"]),
    mt!(Text, 0, 21, "text/css", ["css"]),
    mt!(Text, 0, 22, "text/x-sql", ["sql"]),
    mt!(Text, 0, 23, "text/x-subrip", ["srt"]),
    mt!(Text, 0, 24, "text/vtt", ["vtt"]),
    // Markup
    mt!(Text, F_MARKUP, 30, "text/html", ["html", "htm"]),
    mt!(Text, F_MARKUP, 31, "application/xhtml+xml", ["xhtml"]),
    mt!(Text, F_MARKUP, 32, "text/xml", ["xml", "xsl"]),
    // Structured text
    mt!(Application, F_JSON, 1, "application/json", ["json"]),
    mt!(Application, F_NDJSON, 2, "application/x-ndjson", ["ndjson", "jsonl"]),
    // PDF-like document containers
    mt!(Application, F_PDF, 5, "application/pdf", ["pdf"]),
    mt!(Application, F_PDF, 6, "application/epub+zip", ["epub"]),
    // Office documents
    mt!(
        Application,
        F_OFFICE,
        10,
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ["docx"]
    ),
    mt!(
        Application,
        F_OFFICE,
        11,
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ["xlsx"]
    ),
    mt!(
        Application,
        F_OFFICE,
        12,
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        ["pptx"]
    ),
    mt!(Application, F_OFFICE, 13, "application/vnd.oasis.opendocument.text", ["odt"]),
    mt!(
        Application,
        F_OFFICE,
        14,
        "application/vnd.oasis.opendocument.spreadsheet",
        ["ods"]
    ),
    mt!(
        Application,
        F_OFFICE,
        15,
        "application/vnd.oasis.opendocument.presentation",
        ["odp"]
    ),
    // Archives
    mt!(Application, F_ARCHIVE, 20, "application/zip", ["zip"]),
    mt!(Application, F_ARCHIVE, 21, "application/x-tar", ["tar"]),
    mt!(Application, F_ARCHIVE, 22, "application/x-7z-compressed", ["7z"]),
    mt!(Application, F_ARCHIVE, 23, "application/vnd.rar", ["rar"]),
    mt!(Application, F_ARCHIVE, 24, "application/java-archive", ["jar"]),
    // Compressed single streams (filtered archives)
    mt!(Application, F_ARCHIVE_FILTER, 25, "application/gzip", ["gz", "tgz"]),
    mt!(Application, F_ARCHIVE_FILTER, 26, "application/x-bzip2", ["bz2"]),
    mt!(Application, F_ARCHIVE_FILTER, 27, "application/x-xz", ["xz"]),
    mt!(Application, F_ARCHIVE_FILTER, 28, "application/zstd", ["zst"]),
    // Comic archives
    mt!(Application, F_COMIC, 30, "application/x-cbz", ["cbz"]),
    mt!(Application, F_COMIC, 31, "application/x-cbr", ["cbr"]),
    // Legacy e-books
    mt!(Application, F_MOBI, 33, "application/x-mobipocket-ebook", ["mobi", "azw", "azw3"]),
    // Legacy word-processor formats
    mt!(Application, F_MSDOC, 35, "application/msword", ["doc"]),
    mt!(Application, F_MSDOC, 36, "application/vnd.ms-excel", ["xls"]),
    mt!(Application, F_MSDOC, 37, "application/vnd.ms-powerpoint", ["ppt"]),
    // Sidecar metadata pseudo-type
    mt!(Application, F_SIDECAR, 40, "application/x-trawl-sidecar", ["sidecar"]),
    // Classified but never decoded
    mt!(Application, F_SKIP, 45, "application/x-iso9660-image", ["iso"]),
    mt!(Application, F_SKIP, 46, "application/x-sqlite3", ["sqlite", "sqlite3"]),
    // Audio
    mt!(Audio, 0, 1, "audio/mpeg", ["mp3"]),
    mt!(Audio, 0, 2, "audio/flac", ["flac"]),
    mt!(Audio, 0, 3, "audio/ogg", ["ogg", "oga"]),
    mt!(Audio, 0, 4, "audio/x-wav", ["wav"]),
    mt!(Audio, 0, 5, "audio/mp4", ["m4a"]),
    mt!(Audio, 0, 6, "audio/x-ms-wma", ["wma"]),
    mt!(Audio, 0, 7, "audio/opus", ["opus"]),
    mt!(Audio, 0, 8, "audio/x-aiff", ["aif", "aiff"]),
    // Images
    mt!(Image, 0, 1, "image/jpeg", ["jpg", "jpeg"]),
    mt!(Image, 0, 2, "image/png", ["png"]),
    mt!(Image, 0, 3, "image/gif", ["gif"]),
    mt!(Image, 0, 4, "image/bmp", ["bmp"]),
    mt!(Image, 0, 5, "image/tiff", ["tif", "tiff"]),
    mt!(Image, 0, 6, "image/webp", ["webp"]),
    mt!(Image, 0, 7, "image/heic", ["heic", "heif"]),
    mt!(Image, 0, 8, "image/svg+xml", ["svg"]),
    mt!(Image, 0, 9, "image/x-icon", ["ico"]),
    // Raw camera images
    mt!(Image, F_RAW, 20, "image/x-canon-cr2", ["cr2"]),
    mt!(Image, F_RAW, 21, "image/x-nikon-nef", ["nef"]),
    mt!(Image, F_RAW, 22, "image/x-sony-arw", ["arw"]),
    mt!(Image, F_RAW, 23, "image/x-adobe-dng", ["dng"]),
    mt!(Image, F_RAW, 24, "image/x-olympus-orf", ["orf"]),
    mt!(Image, F_RAW, 25, "image/x-fuji-raf", ["raf"]),
    mt!(Image, F_RAW, 26, "image/x-panasonic-rw2", ["rw2"]),
    // Video
    mt!(Video, 0, 1, "video/mp4", ["mp4", "m4v"]),
    mt!(Video, 0, 2, "video/x-matroska", ["mkv"]),
    mt!(Video, 0, 3, "video/webm", ["webm"]),
    mt!(Video, 0, 4, "video/x-msvideo", ["avi"]),
    mt!(Video, 0, 5, "video/quicktime", ["mov"]),
    mt!(Video, 0, 6, "video/x-ms-wmv", ["wmv"]),
    mt!(Video, 0, 7, "video/x-flv", ["flv"]),
    mt!(Video, 0, 8, "video/mpeg", ["mpg", "mpeg"]),
    // Fonts
    mt!(Font, 0, 1, "font/ttf", ["ttf"]),
    mt!(Font, 0, 2, "font/otf", ["otf"]),
    mt!(Font, 0, 3, "font/woff", ["woff"]),
    mt!(Font, 0, 4, "font/woff2", ["woff2"]),
];

/// Extension and essence lookup tables, built once per scan from [`TYPES`].
pub struct MimeTables {
    by_ext: HashMap<&'static str, MimeCode>,
    by_essence: HashMap<&'static str, MimeCode>,
}

impl MimeTables {
    pub fn new() -> Self {
        let mut by_ext = HashMap::new();
        let mut by_essence = HashMap::new();
        for t in TYPES {
            by_essence.insert(t.essence, t.code);
            for ext in t.exts {
                by_ext.insert(*ext, t.code);
            }
        }
        MimeTables { by_ext, by_essence }
    }

    /// Extension lookup, case-insensitive, dot not included.
    pub fn by_extension(&self, ext: &str) -> Option<MimeCode> {
        let lower = ext.to_ascii_lowercase();
        self.by_ext.get(lower.as_str()).copied()
    }

    /// Map a sniffed mime string to a code.
    pub fn by_essence(&self, essence: &str) -> Option<MimeCode> {
        self.by_essence.get(essence).copied()
    }
}

impl Default for MimeTables {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for t in TYPES {
            assert!(seen.insert(t.code), "duplicate code for {}", t.essence);
        }
    }

    #[test]
    fn extensions_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for t in TYPES {
            for ext in t.exts {
                assert!(seen.insert(*ext), "duplicate extension {}", ext);
            }
        }
    }

    #[test]
    fn extension_lookup() {
        let tables = MimeTables::new();
        let jpg = tables.by_extension("jpg").unwrap();
        assert_eq!(jpg.major(), Major::Image);
        assert_eq!(jpg.essence(), "image/jpeg");
        assert_eq!(tables.by_extension("JPG"), Some(jpg));
        assert_eq!(tables.by_extension("nosuchext"), None);
    }

    #[test]
    fn essence_lookup_round_trip() {
        let tables = MimeTables::new();
        let pdf = tables.by_essence("application/pdf").unwrap();
        assert!(pdf.is_pdf());
        assert_eq!(pdf.essence(), "application/pdf");
    }

    #[test]
    fn dispatch_flags() {
        let tables = MimeTables::new();
        assert!(tables.by_extension("zip").unwrap().is_archive());
        assert!(tables.by_extension("gz").unwrap().is_archive_filter());
        assert!(tables.by_extension("html").unwrap().is_markup());
        assert!(tables.by_extension("cr2").unwrap().is_raw());
        assert!(tables.by_extension("docx").unwrap().is_office());
        assert!(tables.by_extension("mobi").unwrap().is_mobi());
        assert!(tables.by_extension("doc").unwrap().is_msdoc());
        assert!(tables.by_extension("json").unwrap().is_json());
        assert!(tables.by_extension("jsonl").unwrap().is_ndjson());
        assert!(tables.by_extension("cbz").unwrap().is_comic());
        assert_eq!(tables.by_extension("sidecar"), Some(MimeCode::SIDECAR));
        assert_eq!(tables.by_extension("woff").unwrap().major(), Major::Font);
    }

    #[test]
    fn parse_exclusions() {
        let tables = MimeTables::new();
        assert!(!MimeCode::UNKNOWN.should_parse());
        assert!(!MimeCode::EMPTY.should_parse());
        assert!(!tables.by_extension("iso").unwrap().should_parse());
        assert!(tables.by_extension("txt").unwrap().should_parse());
    }

    #[test]
    fn empty_sentinel_essence() {
        assert_eq!(MimeCode::EMPTY.essence(), "application/x-empty");
        assert_eq!(MimeCode::UNKNOWN.essence(), "application/octet-stream");
    }
}
