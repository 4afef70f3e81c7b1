/// Decodes a percent-encoded string (`%XX`) and converts `+` to space.
/// Invalid UTF-8 after decoding is replaced, never rejected.
pub fn url_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hi = (bytes[i + 1] as char).to_digit(16);
                let lo = (bytes[i + 2] as char).to_digit(16);
                match (hi, lo) {
                    (Some(h), Some(l)) => {
                        out.push(((h << 4) | l) as u8);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Percent-encodes everything outside the unreserved URL characters.
pub fn url_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

/// Looks up `key` in a `key=value&key2=value2` query string.
pub fn query_get(query: &str, key: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let mut it = pair.splitn(2, '=');
        let k = url_decode(it.next()?);
        (k == key).then(|| url_decode(it.next().unwrap_or("")))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_handles_utf8_and_plus() {
        assert_eq!(url_decode("Loss%2Ftrain+%28iteration%29"), "Loss/train (iteration)");
        assert_eq!(url_decode("%C3%A9"), "é");
        assert_eq!(url_decode("50%"), "50%");
    }

    #[test]
    fn encode_then_decode() {
        let tag = "Loss/train (iteration)";
        assert_eq!(url_decode(&url_encode(tag)), tag);
        assert_eq!(query_get(&format!("x=1&tag={}", url_encode(tag)), "tag").as_deref(), Some(tag));
        assert_eq!(query_get("x=1", "tag"), None);
    }
}
