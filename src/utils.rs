//! Shared utility functions for the psm core daemon.

use std::time::{SystemTime, UNIX_EPOCH};
use tokio::process::Command;

/// Apply platform-specific flags to hide the console window on Windows.
/// On non-Windows platforms, this is a no-op.
#[cfg(target_os = "windows")]
pub fn apply_creation_flags(cmd: &mut Command) -> &mut Command {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x08000000;
    cmd.creation_flags(CREATE_NO_WINDOW)
}

#[cfg(not(target_os = "windows"))]
pub fn apply_creation_flags(cmd: &mut Command) -> &mut Command {
    cmd
}

/// Decode one line of raw console output from a child process.
///
/// Scripts print in whatever encoding their platform locale dictates, so a
/// strict UTF-8 read is not enough. 디코딩 순서: UTF-8 → cp1251 → cp866 →
/// UTF-8 (lossy). 마지막 단계는 실패하지 않습니다.
pub fn decode_console_bytes(bytes: &[u8]) -> String {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }
    let (decoded, _, had_errors) = encoding_rs::WINDOWS_1251.decode(bytes);
    if !had_errors {
        return decoded.into_owned();
    }
    let (decoded, _, had_errors) = encoding_rs::IBM866.decode(bytes);
    if !had_errors {
        return decoded.into_owned();
    }
    String::from_utf8_lossy(bytes).into_owned()
}

/// Unix timestamp (seconds).
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_utf8_passthrough() {
        assert_eq!(decode_console_bytes(b"hello world"), "hello world");
        assert_eq!(decode_console_bytes("привет".as_bytes()), "привет");
    }

    #[test]
    fn test_decode_cp1251_fallback() {
        // "Ошибка" in cp1251 — not valid UTF-8
        let bytes = [0xCE, 0xF8, 0xE8, 0xE1, 0xEA, 0xE0];
        assert_eq!(decode_console_bytes(&bytes), "Ошибка");
    }

    #[test]
    fn test_decode_never_fails() {
        // 임의의 바이트 시퀀스도 패닉 없이 문자열이 되어야 함
        let garbage = [0xFF, 0xFE, 0x00, 0x98, 0xFF];
        let decoded = decode_console_bytes(&garbage);
        assert!(!decoded.is_empty());
    }

    #[test]
    fn test_current_timestamp_is_sane() {
        // 2021-01-01 이후
        assert!(current_timestamp() > 1_609_459_200);
    }
}
