use std::collections::HashSet;

use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

/// Longest question id accepted as an attachment directory name.
pub const MAX_QUESTION_ID_LEN: usize = 80;
/// Longest stored attachment name, in characters.
pub const MAX_FILE_NAME_CHARS: usize = 150;
pub const FALLBACK_FILE_NAME: &str = "attachment";

const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "log", "csv", "ini", "cfg", "conf", "config", "properties", "env", "toml",
    "yaml", "yml", "xml", "sql", "sh", "bash", "ps1", "bat", "cmd", "py", "js", "ts", "tsx",
    "jsx", "css", "scss", "less", "html", "htm", "cs", "csproj", "sln", "cpp", "c", "h", "hpp",
    "java", "kt", "go", "rs", "php", "rb", "swift", "dart",
];

/// Question ids double as directory names, so only `[A-Za-z0-9_-]{1,80}` passes.
pub fn is_safe_question_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_QUESTION_ID_LEN
        && id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
}

/// True when `name` is a bare file name with no directory components.
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && base_name(name) == name
}

/// Final path component of `name`, treating both separators as boundaries.
pub fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Content type served for an allow-listed extension, `None` for everything else.
pub fn content_type_for(file_name: &str) -> Option<&'static str> {
    let (_, extension) = split_extension(file_name);
    let extension = extension.strip_prefix('.')?.to_ascii_lowercase();
    let content_type = match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "json" => JSON_CONTENT_TYPE,
        other if TEXT_EXTENSIONS.contains(&other) => TEXT_CONTENT_TYPE,
        _ => return None,
    };
    Some(content_type)
}

/// Split `name` into stem and extension (extension keeps its leading dot).
/// Dotfiles such as `.env` come back with an empty stem.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(index) if index > 0 => name.split_at(index),
        Some(0) if name.len() > 1 => ("", name),
        _ => (name, ""),
    }
}

fn is_invalid_file_char(ch: char) -> bool {
    ch.is_control() || matches!(ch, '"' | '<' | '>' | '|' | ':' | '*' | '?' | '\\' | '/')
}

/// Make `name` safe to use as a file name on every platform.
pub fn sanitize_file_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return FALLBACK_FILE_NAME.to_string();
    }

    let replaced: String = trimmed
        .chars()
        .map(|ch| if is_invalid_file_char(ch) { '_' } else { ch })
        .collect();
    let replaced = replaced.trim();
    if replaced.is_empty() || replaced == "." || replaced == ".." {
        return FALLBACK_FILE_NAME.to_string();
    }

    replaced.chars().take(MAX_FILE_NAME_CHARS).collect()
}

/// Hands out attachment names that are unique ignoring case.
#[derive(Debug, Default)]
pub struct NameAllocator {
    used: HashSet<String>,
}

impl NameAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `name` as taken without allocating it.
    pub fn reserve(&mut self, name: &str) {
        let name = name.trim();
        if !name.is_empty() {
            self.used.insert(fold_case(name));
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.used.contains(&fold_case(name))
    }

    /// Return `desired` or the first free `{stem}_{n}{ext}` variant, and reserve it.
    pub fn allocate(&mut self, desired: &str) -> String {
        let (stem, extension) = split_extension(desired);
        let stem = if stem.trim().is_empty() {
            FALLBACK_FILE_NAME
        } else {
            stem
        };

        let mut candidate = format!("{stem}{extension}");
        let mut counter = 1u32;
        while self.contains(&candidate) {
            candidate = format!("{stem}_{counter}{extension}");
            counter += 1;
        }
        self.used.insert(fold_case(&candidate));
        candidate
    }
}

/// Case-insensitive equality used for attachment names.
pub fn same_file_name(left: &str, right: &str) -> bool {
    left == right || fold_case(left) == fold_case(right)
}

fn fold_case(name: &str) -> String {
    name.to_lowercase()
}

/// Decode an inline attachment payload, accepting an optional
/// `data:<type>;base64,` prefix and embedded whitespace.
pub fn decode_base64_payload(payload: &str) -> Result<Vec<u8>> {
    let mut text = payload.trim();
    if let Some((prefix, rest)) = text.split_once(',') {
        if prefix.to_ascii_lowercase().contains("base64") {
            text = rest;
        }
    }
    let compact: String = text.chars().filter(|ch| !ch.is_ascii_whitespace()).collect();
    BASE64
        .decode(compact.as_bytes())
        .context("attachment payload is not valid base64")
}
