use crate::photometa_core::decode::probe_corrupted;
use crate::photometa_core::media::{FileIntegrity, RawFile, SecurityChecks};
use crate::photometa_core::signature::{
    crc32_hex, has_executable_signature, has_suspicious_header, is_declared_format_plausible,
    md5_hex, sha256_hex,
};
use std::panic::{self, AssertUnwindSafe};

/// Run one sub-check, replacing a panic with its safe default.
pub(crate) fn isolated<T>(check: &str, fallback: T, f: impl FnOnce() -> T) -> T {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            log::warn!("Check '{}' panicked, using its default", check);
            fallback
        }
    }
}

/// Build the integrity verdict for a file whose content is `bytes`.
///
/// All sub-checks are read-only over the same buffer and run concurrently.
/// None of them can fail the evaluation.
pub fn evaluate(file: &RawFile, bytes: &[u8]) -> FileIntegrity {
    let mut md5 = String::new();
    let mut sha256 = String::new();
    let mut crc32 = String::new();
    let mut has_executable_code = false;
    let mut has_suspicious_headers = false;
    let mut is_valid_format = true;
    let mut is_corrupted = false;

    rayon::scope(|s| {
        s.spawn(|_| md5 = isolated("md5", String::new(), || md5_hex(bytes)));
        s.spawn(|_| sha256 = isolated("sha256", String::new(), || sha256_hex(bytes)));
        s.spawn(|_| crc32 = isolated("crc32", String::new(), || crc32_hex(bytes)));
        s.spawn(|_| {
            has_executable_code =
                isolated("executable", false, || has_executable_signature(bytes))
        });
        s.spawn(|_| {
            has_suspicious_headers = isolated("headers", false, || has_suspicious_header(bytes))
        });
        s.spawn(|_| {
            is_valid_format = isolated("format", true, || {
                is_declared_format_plausible(&file.mime_type, &file.name)
            })
        });
        s.spawn(|_| is_corrupted = isolated("decode", false, || probe_corrupted(bytes)));
    });

    if has_executable_code || has_suspicious_headers {
        log::warn!(
            "Security warning for {}: executable={}, suspicious_headers={}",
            file.name,
            has_executable_code,
            has_suspicious_headers
        );
    }

    FileIntegrity {
        md5_hash: md5,
        sha256_hash: sha256,
        crc32_hash: crc32,
        is_corrupted,
        security_checks: SecurityChecks {
            has_executable_code,
            has_suspicious_headers,
            is_valid_format,
        },
    }
}
