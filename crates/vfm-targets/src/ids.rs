use std::sync::OnceLock;

use regex::Regex;

use crate::error::AdbError;

fn connect_addr_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\d{1,3}(\.\d{1,3}){3}:\d{1,5}$").expect("connect address pattern is valid")
    })
}

/// Checks a wireless `ip:port` address and returns it trimmed.
pub fn validate_connect_addr(addr: &str) -> Result<&str, AdbError> {
    let trimmed = addr.trim();
    if connect_addr_pattern().is_match(trimmed) {
        Ok(trimmed)
    } else {
        Err(AdbError::InvalidAddress(addr.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_dotted_quad_with_port() {
        assert_eq!(validate_connect_addr("192.168.0.12:5555").unwrap(), "192.168.0.12:5555");
        assert_eq!(validate_connect_addr(" 10.0.0.1:1 ").unwrap(), "10.0.0.1:1");
    }

    #[test]
    fn rejects_everything_else() {
        for addr in [
            "",
            "192.168.0.12",
            "192.168.0:5555",
            "phone.local:5555",
            "192.168.0.12:123456",
            "1234.1.1.1:5555",
            "192.168.0.12:5555; rm -rf /",
        ] {
            assert!(
                matches!(validate_connect_addr(addr), Err(AdbError::InvalidAddress(_))),
                "{addr} should be rejected"
            );
        }
    }
}
