//! Depth-list decoder.
//!
//! Book rows carry each side as a nested pair list, written the way the
//! feed's producer prints a list of two-element lists:
//!
//! ```text
//! [[112300.5, 0.25], [112300.0, 1.0]]
//! [['112300.5', '0.25']]
//! []
//! ```
//!
//! The text is treated purely as a two-column numeric table. Pairs come out
//! in input order because later duplicates of a price within one row must
//! overwrite earlier ones.
//!
//! # Example
//!
//! ```
//! use l2_book_reconstructor::depth_list::decode_levels;
//!
//! let levels = decode_levels("[[100, 5], [99, 3]]").unwrap();
//! assert_eq!(levels.len(), 2);
//! assert_eq!(levels[0].price.to_string(), "100");
//! ```

use rust_decimal::Decimal;
use thiserror::Error;

use crate::error::ReconError;
use crate::types::{parse_decimal, PriceLevel, Symbol, Timestamp};

/// Why a depth list failed to decode.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DepthListError {
    #[error("expected '{expected}' at offset {offset}, found {found}")]
    Unexpected {
        expected: char,
        offset: usize,
        found: String,
    },

    #[error("pair at offset {offset} has {count} elements, expected 2")]
    PairArity { offset: usize, count: usize },

    #[error("non-numeric token {token:?} at offset {offset}")]
    NonNumeric { token: String, offset: usize },

    #[error("unbalanced nesting: input ended inside a list")]
    Unbalanced,

    #[error("trailing characters at offset {offset}")]
    Trailing { offset: usize },
}

impl DepthListError {
    /// Attach row context, producing the crate-level decode error.
    pub fn into_recon_error(self, symbol: &Symbol, timestamp: Timestamp, raw: &str) -> ReconError {
        ReconError::Decode {
            symbol: symbol.clone(),
            timestamp,
            raw: raw.to_string(),
            reason: self.to_string(),
        }
    }
}

/// Decode a depth list into ordered (price, quantity) levels.
///
/// Blank text and `[]` both decode to an empty list.
pub fn decode_levels(raw: &str) -> std::result::Result<Vec<PriceLevel>, DepthListError> {
    let mut cursor = Cursor::new(raw);
    cursor.skip_ws();
    if cursor.at_end() {
        return Ok(Vec::new());
    }

    cursor.expect('[')?;
    let mut levels = Vec::new();

    cursor.skip_ws();
    if cursor.eat(']') {
        cursor.finish()?;
        return Ok(levels);
    }

    loop {
        levels.push(cursor.pair()?);
        cursor.skip_ws();
        match cursor.peek() {
            Some(',') => {
                cursor.bump();
                cursor.skip_ws();
                // tolerate a trailing comma before the closing bracket
                if cursor.eat(']') {
                    break;
                }
            }
            Some(']') => {
                cursor.bump();
                break;
            }
            Some(_) => return Err(cursor.unexpected(']')),
            None => return Err(DepthListError::Unbalanced),
        }
    }

    cursor.finish()?;
    Ok(levels)
}

/// Decode one side of a book row, attaching the row's symbol and timestamp
/// to any failure.
pub fn decode_row_side(
    symbol: &Symbol,
    timestamp: Timestamp,
    raw: &str,
) -> crate::error::Result<Vec<PriceLevel>> {
    decode_levels(raw).map_err(|e| e.into_recon_error(symbol, timestamp, raw))
}

struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    #[inline]
    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    #[inline]
    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
        }
    }

    #[inline]
    fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: char) -> DepthListError {
        match self.peek() {
            None => DepthListError::Unbalanced,
            Some(found) => DepthListError::Unexpected {
                expected,
                offset: self.pos,
                found: format!("{found:?}"),
            },
        }
    }

    fn expect(&mut self, c: char) -> std::result::Result<(), DepthListError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.unexpected(c))
        }
    }

    fn finish(&mut self) -> std::result::Result<(), DepthListError> {
        self.skip_ws();
        if self.at_end() {
            Ok(())
        } else {
            Err(DepthListError::Trailing { offset: self.pos })
        }
    }

    /// `[price, quantity]`
    fn pair(&mut self) -> std::result::Result<PriceLevel, DepthListError> {
        let start = self.pos;
        self.expect('[')?;

        let mut values: Vec<Decimal> = Vec::with_capacity(2);
        self.skip_ws();
        if !self.eat(']') {
            loop {
                self.skip_ws();
                values.push(self.number()?);
                self.skip_ws();
                match self.peek() {
                    Some(',') => self.bump(),
                    Some(']') => {
                        self.bump();
                        break;
                    }
                    Some('[') => {
                        return Err(DepthListError::NonNumeric {
                            token: "[".to_string(),
                            offset: self.pos,
                        })
                    }
                    Some(_) => return Err(self.unexpected(']')),
                    None => return Err(DepthListError::Unbalanced),
                }
            }
        }

        if values.len() != 2 {
            return Err(DepthListError::PairArity {
                offset: start,
                count: values.len(),
            });
        }
        Ok(PriceLevel::new(values[0], values[1]))
    }

    /// A bare or quoted number.
    fn number(&mut self) -> std::result::Result<Decimal, DepthListError> {
        let offset = self.pos;
        let token = match self.peek() {
            Some(q @ ('\'' | '"')) => {
                self.bump();
                let begin = self.pos;
                while matches!(self.peek(), Some(c) if c != q) {
                    self.bump();
                }
                if self.at_end() {
                    return Err(DepthListError::Unbalanced);
                }
                let token = &self.text[begin..self.pos];
                self.bump();
                token
            }
            Some(_) => {
                let begin = self.pos;
                while matches!(self.peek(), Some(c) if !matches!(c, ',' | ']' | '[') && !c.is_whitespace())
                {
                    self.bump();
                }
                &self.text[begin..self.pos]
            }
            None => return Err(DepthListError::Unbalanced),
        };

        parse_decimal(token).ok_or_else(|| DepthListError::NonNumeric {
            token: token.to_string(),
            offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_empty_inputs() {
        assert!(decode_levels("").unwrap().is_empty());
        assert!(decode_levels("   ").unwrap().is_empty());
        assert!(decode_levels("[]").unwrap().is_empty());
        assert!(decode_levels(" [ ] ").unwrap().is_empty());
    }

    #[test]
    fn test_decode_preserves_order() {
        let levels = decode_levels("[[100, 5], [99, 3], [100, 7]]").unwrap();
        assert_eq!(
            levels,
            vec![
                PriceLevel::new(dec!(100), dec!(5)),
                PriceLevel::new(dec!(99), dec!(3)),
                PriceLevel::new(dec!(100), dec!(7)),
            ]
        );
    }

    #[test]
    fn test_decode_quoted_and_scientific() {
        let levels = decode_levels("[['112300.5', \"0.25\"], [1.5e2, 1e-3]]").unwrap();
        assert_eq!(levels[0], PriceLevel::new(dec!(112300.5), dec!(0.25)));
        assert_eq!(levels[1], PriceLevel::new(dec!(150), dec!(0.001)));
    }

    #[test]
    fn test_decode_zero_and_negative_quantities_pass_through() {
        let levels = decode_levels("[[100, 0], [99, -1]]").unwrap();
        assert_eq!(levels[0].quantity, Decimal::ZERO);
        assert_eq!(levels[1].quantity, dec!(-1));
    }

    #[test]
    fn test_trailing_comma_tolerated() {
        let levels = decode_levels("[[1, 2],]").unwrap();
        assert_eq!(levels.len(), 1);
    }

    #[test]
    fn test_pair_arity_errors() {
        assert!(matches!(
            decode_levels("[[100]]"),
            Err(DepthListError::PairArity { count: 1, .. })
        ));
        assert!(matches!(
            decode_levels("[[100, 1, 2]]"),
            Err(DepthListError::PairArity { count: 3, .. })
        ));
        assert!(matches!(
            decode_levels("[[]]"),
            Err(DepthListError::PairArity { count: 0, .. })
        ));
    }

    #[test]
    fn test_non_numeric_token() {
        let err = decode_levels("[[abc, 1]]").unwrap_err();
        assert!(matches!(err, DepthListError::NonNumeric { ref token, .. } if token == "abc"));
    }

    #[test]
    fn test_unbalanced_nesting() {
        assert_eq!(decode_levels("[[100, 1]"), Err(DepthListError::Unbalanced));
        assert_eq!(decode_levels("[[100, 1"), Err(DepthListError::Unbalanced));
        assert!(decode_levels("[[[100, 1]]]").is_err());
        assert!(decode_levels("100, 1").is_err());
    }

    #[test]
    fn test_trailing_garbage() {
        assert!(matches!(
            decode_levels("[[1, 2]] x"),
            Err(DepthListError::Trailing { .. })
        ));
    }

    #[test]
    fn test_decode_row_side_carries_context() {
        let symbol = Symbol::new("BTC/USD");
        let err = decode_row_side(&symbol, Timestamp::from(42), "[[1, 2]").unwrap_err();
        match err {
            ReconError::Decode {
                symbol,
                timestamp,
                raw,
                ..
            } => {
                assert_eq!(symbol.as_str(), "BTC/USD");
                assert_eq!(timestamp, Timestamp::from(42));
                assert_eq!(raw, "[[1, 2]");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
