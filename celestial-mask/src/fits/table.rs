//! Binary-table column forms (`TFORMn`).
//!
//! A form is `rT` for `r` elements of type `T`, or `rPT(max)` / `rQT(max)`
//! for a variable-length array whose elements live on the heap.

use crate::errors::{MaskError, Result};
use std::fmt;

/// A parsed `TFORM` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TForm {
    pub repeat: usize,
    /// Element type: `L X B I J K A E D C M`.
    pub code: char,
    /// Elements are stored on the heap behind a descriptor.
    pub variable: bool,
    /// 64-bit (`Q`) rather than 32-bit (`P`) descriptors.
    pub wide_descriptor: bool,
    /// Declared maximum length of a variable-length array.
    pub max_len: Option<usize>,
}

impl TForm {
    pub fn scalar(code: char) -> Self {
        Self::fixed(1, code)
    }

    pub fn fixed(repeat: usize, code: char) -> Self {
        Self {
            repeat,
            code,
            variable: false,
            wide_descriptor: false,
            max_len: None,
        }
    }

    pub fn heap(code: char, max_len: usize) -> Self {
        Self {
            repeat: 1,
            code,
            variable: true,
            wide_descriptor: false,
            max_len: Some(max_len),
        }
    }

    /// # Errors
    /// Returns a validation error for an empty form, a bad repeat count,
    /// or an unknown type code.
    pub fn parse(form: &str) -> Result<Self> {
        let form = form.trim();
        let digits = form.chars().take_while(char::is_ascii_digit).count();
        let repeat = if digits == 0 {
            1
        } else {
            form[..digits]
                .parse()
                .map_err(|_| invalid(form, "bad repeat count"))?
        };

        let mut rest = form[digits..].chars();
        let first = rest.next().ok_or_else(|| invalid(form, "missing data type"))?;

        if first == 'P' || first == 'Q' {
            let code = rest.next().ok_or_else(|| invalid(form, "missing array element type"))?;
            check_code(form, code)?;
            let tail: String = rest.collect();
            let max_len = tail
                .trim()
                .strip_prefix('(')
                .and_then(|t| t.strip_suffix(')'))
                .and_then(|t| t.trim().parse().ok());
            return Ok(Self {
                repeat,
                code,
                variable: true,
                wide_descriptor: first == 'Q',
                max_len,
            });
        }

        check_code(form, first)?;
        Ok(Self::fixed(repeat, first))
    }

    /// Size in bytes of one element of this type.
    pub fn element_size(code: char) -> usize {
        match code {
            'L' | 'X' | 'B' | 'A' => 1,
            'I' => 2,
            'J' | 'E' => 4,
            'K' | 'D' | 'C' => 8,
            'M' => 16,
            _ => 0,
        }
    }

    /// Bytes this field occupies in each row.
    pub fn width(&self) -> usize {
        if self.variable {
            let descriptor = if self.wide_descriptor { 16 } else { 8 };
            return self.repeat.min(1) * descriptor;
        }
        if self.code == 'X' {
            return self.repeat.div_ceil(8);
        }
        self.repeat * Self::element_size(self.code)
    }

    /// Element types that map onto column data.
    pub fn is_supported(&self) -> bool {
        matches!(self.code, 'L' | 'B' | 'I' | 'J' | 'K' | 'A' | 'E' | 'D')
    }

    pub fn is_real(&self) -> bool {
        matches!(self.code, 'E' | 'D')
    }
}

impl fmt::Display for TForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.variable {
            let descriptor = if self.wide_descriptor { 'Q' } else { 'P' };
            if self.repeat != 1 {
                write!(f, "{}", self.repeat)?;
            }
            write!(f, "{}{}(", descriptor, self.code)?;
            if let Some(max) = self.max_len {
                write!(f, "{}", max)?;
            }
            write!(f, ")")
        } else if self.repeat == 1 {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}{}", self.repeat, self.code)
        }
    }
}

fn check_code(form: &str, code: char) -> Result<()> {
    if TForm::element_size(code) == 0 {
        return Err(invalid(form, &format!("unknown data type '{}'", code)));
    }
    Ok(())
}

fn invalid(form: &str, reason: &str) -> MaskError {
    MaskError::validation("TForm::parse", &format!("binary form '{}': {}", form, reason))
}

/// Range of raw values a stored integer type can hold.
pub(crate) fn integer_range(code: char) -> (i128, i128) {
    match code {
        'B' => (0, u8::MAX as i128),
        'I' => (i16::MIN as i128, i16::MAX as i128),
        'J' => (i32::MIN as i128, i32::MAX as i128),
        _ => (i64::MIN as i128, i64::MAX as i128),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalar_and_repeat() {
        assert_eq!(TForm::parse("D").unwrap(), TForm::scalar('D'));
        assert_eq!(TForm::parse("36D").unwrap(), TForm::fixed(36, 'D'));
        assert_eq!(TForm::parse(" 16A ").unwrap(), TForm::fixed(16, 'A'));
        assert_eq!(TForm::parse("0D").unwrap().width(), 0);
    }

    #[test]
    fn test_parse_variable_length() {
        let form = TForm::parse("PK(12)").unwrap();
        assert!(form.variable);
        assert_eq!(form.code, 'K');
        assert_eq!(form.max_len, Some(12));
        assert_eq!(form.width(), 8);

        let form = TForm::parse("1QD()").unwrap();
        assert!(form.wide_descriptor);
        assert_eq!(form.max_len, None);
        assert_eq!(form.width(), 16);
    }

    #[test]
    fn test_parse_errors() {
        assert!(TForm::parse("").is_err());
        assert!(TForm::parse("12").is_err());
        assert!(TForm::parse("3Z").is_err());
        assert!(TForm::parse("P").is_err());
    }

    #[test]
    fn test_widths() {
        assert_eq!(TForm::parse("3J").unwrap().width(), 12);
        assert_eq!(TForm::parse("L").unwrap().width(), 1);
        assert_eq!(TForm::parse("10X").unwrap().width(), 2);
        assert_eq!(TForm::parse("2M").unwrap().width(), 32);
    }

    #[test]
    fn test_display() {
        assert_eq!(TForm::fixed(24, 'D').to_string(), "24D");
        assert_eq!(TForm::scalar('J').to_string(), "J");
        assert_eq!(TForm::heap('K', 4).to_string(), "PK(4)");
    }

    #[test]
    fn test_supported_codes() {
        assert!(TForm::scalar('K').is_supported());
        assert!(!TForm::scalar('C').is_supported());
        assert!(TForm::scalar('E').is_real());
    }
}
