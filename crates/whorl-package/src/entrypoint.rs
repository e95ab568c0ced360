//! Entrypoint launcher injection.
//!
//! A packaged module carries a launcher: an exported `_start` function that
//! calls the item's `$use`. It is inserted before the module's closing
//! parenthesis and tagged with [`ENTRYPOINT_MARKER`].

use std::ops::Range;
use std::path::Path;
use tracing::debug;
use whorl_core::{Error, Result};
use whorl_runtime::contract::START_EXPORT;

/// Comment marking an injected launcher.
pub const ENTRYPOINT_MARKER: &str = ";; whorl:entrypoint";

/// The launcher block as inserted.
pub const LAUNCHER: &str = "\n  ;; whorl:entrypoint\n  (func $whorl_main (export \"_start\")\n    (drop (call $use)))\n";

/// Returns `true` if `source` already carries a launcher or exports `_start`.
///
/// Only an `(export "_start"` form in code counts; the name appearing in a
/// comment or a data string does not.
#[must_use]
pub fn has_entrypoint(source: &str) -> bool {
    source.contains(ENTRYPOINT_MARKER) || exports_start(source)
}

/// Lexical unit outside comments.
enum Token {
    /// A code byte and its offset.
    Code(usize, u8),
    /// The contents of a string literal, quotes excluded.
    Str(Range<usize>),
}

/// Walks `source`, skipping line and nested block comments.
fn scan(source: &str, mut on_token: impl FnMut(Token)) {
    let bytes = source.as_bytes();
    let mut block_depth = 0usize;
    let mut string_start = None;
    let mut i = 0;

    while i < bytes.len() {
        let byte = bytes[i];
        let next = bytes.get(i + 1).copied();
        if let Some(start) = string_start {
            match byte {
                b'\\' => i += 1,
                b'"' => {
                    on_token(Token::Str(start..i));
                    string_start = None;
                }
                _ => {}
            }
        } else if block_depth > 0 {
            match (byte, next) {
                (b'(', Some(b';')) => {
                    block_depth += 1;
                    i += 1;
                }
                (b';', Some(b')')) => {
                    block_depth -= 1;
                    i += 1;
                }
                _ => {}
            }
        } else {
            match (byte, next) {
                (b';', Some(b';')) => {
                    while i < bytes.len() && bytes[i] != b'\n' {
                        i += 1;
                    }
                }
                (b'(', Some(b';')) => {
                    block_depth = 1;
                    i += 1;
                }
                (b'"', _) => string_start = Some(i + 1),
                _ => on_token(Token::Code(i, byte)),
            }
        }
        i += 1;
    }
}

/// Byte offset of the last `)` outside comments and strings.
fn closing_paren(source: &str) -> Option<usize> {
    let mut last = None;
    scan(source, |token| {
        if let Token::Code(index, b')') = token {
            last = Some(index);
        }
    });
    last
}

/// Whether an `(export "_start"` form appears in code.
fn exports_start(source: &str) -> bool {
    const EXPORT: &[u8; 7] = b"(export";
    let mut window = [0u8; 7];
    let mut found = false;
    scan(source, |token| {
        let byte = match token {
            Token::Code(_, byte) if byte.is_ascii_whitespace() => return,
            Token::Code(_, byte) => byte,
            Token::Str(range) => {
                found |= window == *EXPORT && &source[range] == START_EXPORT;
                b'"'
            }
        };
        window.rotate_left(1);
        window[EXPORT.len() - 1] = byte;
    });
    found
}

/// Returns `source` with the launcher inserted, or `None` if it already has
/// one.
///
/// # Errors
///
/// Returns [`Error::StructureError`] naming `path` if the module has no
/// closing parenthesis.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use whorl_package::entrypoint::{ENTRYPOINT_MARKER, inject_entrypoint};
///
/// let source = "(module $Lamp\n  (func $use (export \"use\") (result i32) (i32.const 0)))\n";
/// let patched = inject_entrypoint(source, Path::new("lamp.wat")).unwrap().unwrap();
/// assert!(patched.contains(ENTRYPOINT_MARKER));
/// assert!(inject_entrypoint(&patched, Path::new("lamp.wat")).unwrap().is_none());
/// ```
pub fn inject_entrypoint(source: &str, path: &Path) -> Result<Option<String>> {
    if has_entrypoint(source) {
        return Ok(None);
    }
    let index = closing_paren(source).ok_or_else(|| Error::StructureError {
        path: path.to_path_buf(),
        reason: "module has no closing parenthesis".to_string(),
    })?;
    let mut patched = String::with_capacity(source.len() + LAUNCHER.len());
    patched.push_str(&source[..index]);
    patched.push_str(LAUNCHER);
    patched.push_str(&source[index..]);
    Ok(Some(patched))
}

/// Ensures the module file at `path` carries the launcher.
///
/// Idempotent. Returns `true` if the file was modified.
///
/// # Errors
///
/// Returns [`Error::StructureError`] if the file cannot be read, is not
/// UTF-8 text or has no closing parenthesis, and [`Error::Io`] if it cannot
/// be written back.
pub fn ensure_entrypoint(path: &Path) -> Result<bool> {
    let source = std::fs::read_to_string(path).map_err(|e| Error::StructureError {
        path: path.to_path_buf(),
        reason: format!("cannot read module text: {e}"),
    })?;
    let Some(patched) = inject_entrypoint(&source, path)? else {
        debug!(path = %path.display(), "entrypoint already present");
        return Ok(false);
    };
    std::fs::write(path, patched).map_err(|e| Error::io(path, e))?;
    debug!(path = %path.display(), "entrypoint injected");
    Ok(true)
}
