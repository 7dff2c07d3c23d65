//! License-plate helpers for the coding/odd-even scheme.

/// Terminal digit of a license plate, or `None` when the plate carries no
/// digit at all (diplomatic and some vanity plates).
pub fn terminal_digit(plate: &str) -> Option<u8> {
    plate
        .chars()
        .rev()
        .find(|c| c.is_ascii_digit())
        .map(|c| c as u8 - b'0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_plates() {
        assert_eq!(terminal_digit("ABC-1234"), Some(4));
        assert_eq!(terminal_digit("NDF 722"), Some(2));
        assert_eq!(terminal_digit("XYZ 905"), Some(5));
    }

    #[test]
    fn test_trailing_letters() {
        // Some series append a letter after the digits
        assert_eq!(terminal_digit("123-ABC"), Some(3));
    }

    #[test]
    fn test_no_digit() {
        assert_eq!(terminal_digit("CD-PLATE"), None);
        assert_eq!(terminal_digit(""), None);
    }
}
