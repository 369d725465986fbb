//! base64url and MIME helpers
//!
//! Gmail transports bodies and outbound messages as base64url without
//! guaranteed padding. Decoding here is best effort: bodies are only ever
//! displayed, so a malformed payload turns into an empty string instead of
//! an error.

use base64::alphabet;
use base64::engine::general_purpose::{self, GeneralPurpose};
use base64::prelude::*;

/// Standard alphabet, canonical padding, tolerant of non-zero trailing bits
const LENIENT_STANDARD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    general_purpose::PAD.with_decode_allow_trailing_bits(true),
);

/// Decode a Gmail base64url payload into UTF-8 text.
///
/// Translates the URL-safe alphabet to the standard one, restores padding to
/// a multiple of four and decodes. Invalid UTF-8 sequences are replaced;
/// any base64 failure yields an empty string.
pub fn decode_base64url(data: &str) -> String {
    let mut fixed: String = data
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();

    while fixed.ends_with('=') {
        fixed.pop();
    }
    let pad = fixed.len() % 4;
    if pad != 0 {
        fixed.extend(std::iter::repeat_n('=', 4 - pad));
    }

    match LENIENT_STANDARD.decode(fixed.as_bytes()) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) => {
            log::debug!("Discarding undecodable body ({} chars): {}", data.len(), e);
            String::new()
        }
    }
}

/// Encode bytes as base64url without padding (the form Gmail expects in `raw`)
pub fn encode_base64url(bytes: impl AsRef<[u8]>) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// Encode a header value as an RFC 2047 encoded-word
pub fn encode_header_word(text: &str) -> String {
    format!("=?utf-8?B?{}?=", BASE64_STANDARD.encode(text.as_bytes()))
}

/// Build an outbound HTML message and return it base64url-encoded, ready for
/// the `raw` field of messages.send.
pub fn build_raw_message(to: &str, subject: &str, html_body: &str) -> String {
    let to: String = to.chars().filter(|c| *c != '\r' && *c != '\n').collect();
    let message = [
        format!("To: {}", to.trim()),
        format!("Subject: {}", encode_header_word(subject)),
        "Content-Type: text/html; charset=utf-8".to_string(),
        "MIME-Version: 1.0".to_string(),
        String::new(),
        html_body.to_string(),
    ]
    .join("\r\n");

    encode_base64url(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_unpadded() {
        // "Hello, World!" in base64url
        assert_eq!(decode_base64url("SGVsbG8sIFdvcmxkIQ"), "Hello, World!");
    }

    #[test]
    fn test_decode_url_safe_alphabet() {
        // bytes 0xfb 0xff encode to "-_8" in base64url
        let encoded = encode_base64url("ûÿ?".as_bytes());
        assert_eq!(decode_base64url(&encoded), "ûÿ?");

        let html = "<p>a > b && c</p>";
        assert_eq!(decode_base64url(&BASE64_URL_SAFE.encode(html)), html);
    }

    #[test]
    fn test_round_trip_every_padding_length() {
        let samples = ["", "a", "ab", "abc", "abcd", "héllo wörld", "<div>✓</div>\r\n"];
        for sample in samples {
            let unpadded = BASE64_URL_SAFE_NO_PAD.encode(sample);
            let padded = BASE64_URL_SAFE.encode(sample);
            assert_eq!(decode_base64url(&unpadded), sample, "unpadded {sample:?}");
            assert_eq!(decode_base64url(&padded), sample, "padded {sample:?}");
        }
    }

    #[test]
    fn test_decode_failure_is_empty() {
        assert_eq!(decode_base64url("a"), "");
        assert_eq!(decode_base64url("!!!!"), "");
    }

    #[test]
    fn test_decode_ignores_line_breaks() {
        assert_eq!(decode_base64url("SGVs\r\nbG8"), "Hello");
    }

    #[test]
    fn test_decode_invalid_utf8_is_lossy() {
        let encoded = BASE64_URL_SAFE_NO_PAD.encode([0x68, 0x69, 0xff]);
        assert_eq!(decode_base64url(&encoded), "hi\u{fffd}");
    }

    #[test]
    fn test_encode_header_word() {
        assert_eq!(encode_header_word("Hi"), "=?utf-8?B?SGk=?=");
    }

    #[test]
    fn test_build_raw_message() {
        let raw = build_raw_message("bob@example.com\r\nBcc: evil@x.com", "Re: Café", "<p>Thanks</p>");
        assert!(!raw.contains('+') && !raw.contains('/') && !raw.contains('='));

        let decoded = decode_base64url(&raw);
        let mut lines = decoded.split("\r\n");
        assert_eq!(lines.next(), Some("To: bob@example.comBcc: evil@x.com"));
        assert_eq!(
            lines.next(),
            Some(format!("Subject: {}", encode_header_word("Re: Café")).as_str())
        );
        assert_eq!(lines.next(), Some("Content-Type: text/html; charset=utf-8"));
        assert_eq!(lines.next(), Some("MIME-Version: 1.0"));
        assert_eq!(lines.next(), Some(""));
        assert_eq!(lines.next(), Some("<p>Thanks</p>"));
    }
}
