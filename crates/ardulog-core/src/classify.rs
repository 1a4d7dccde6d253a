//! Line classification
//!
//! Decides whether a line received from the device is loggable data or
//! diagnostic noise. Devices running the expected sketch emit data rows as
//! pipe-separated numbers, so a line starting with a decimal digit is data;
//! anything else (boot banners, debug prints, garbage from the bootloader)
//! is diagnostic.

/// Classification of one line from the device stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    /// Loggable data row
    Data,
    /// Diagnostic noise; the original text is kept by the caller
    Diagnostic,
}

/// Classify a line from the device stream.
///
/// The line is trimmed before inspection; a leading ASCII decimal digit
/// marks it as data.
pub fn classify(line: &str) -> LineClass {
    match line.trim().chars().next() {
        Some(c) if c.is_ascii_digit() => LineClass::Data,
        _ => LineClass::Diagnostic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digit_first_is_data() {
        assert_eq!(classify("12|34|56"), LineClass::Data);
        assert_eq!(classify("0"), LineClass::Data);
        assert_eq!(classify("9|x"), LineClass::Data);
    }

    #[test]
    fn leading_whitespace_is_trimmed() {
        assert_eq!(classify("  42|1"), LineClass::Data);
        assert_eq!(classify("\t7"), LineClass::Data);
    }

    #[test]
    fn non_digit_first_is_diagnostic() {
        assert_eq!(classify("READY"), LineClass::Diagnostic);
        assert_eq!(classify("ERROR: sensor offline"), LineClass::Diagnostic);
        assert_eq!(classify("-12|34"), LineClass::Diagnostic);
        assert_eq!(classify(".5"), LineClass::Diagnostic);
    }

    #[test]
    fn empty_and_blank_are_diagnostic() {
        assert_eq!(classify(""), LineClass::Diagnostic);
        assert_eq!(classify("   "), LineClass::Diagnostic);
    }

    #[test]
    fn non_ascii_digits_are_diagnostic() {
        // Only '0'-'9' count, not other Unicode digits
        assert_eq!(classify("٣|4"), LineClass::Diagnostic);
    }
}
