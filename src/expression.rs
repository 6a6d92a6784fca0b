//! Expression and lvalue decoding
//!
//! Expressions are a flat token stream: operands (scoped variables,
//! immediates, arrays, builtin calls) interleaved with operator tokens.
//! Parentheses are explicit tokens, so the text is rebuilt in stream order
//! without any precedence handling.

use crate::cursor::ByteCursor;
use crate::error::{DecompileError, Result};
use log::warn;

/// Default terminator of a right-hand-side expression
pub const END_EXPR: u8 = 99;
/// Terminator of array indices and offset suffixes
pub const INDEX_END: u8 = 12;
pub const GROUP_OPEN: u8 = 9;
pub const GROUP_CLOSE: u8 = 10;

const PTR_FIXED: u8 = 14;
const PTR_INDEXED: u8 = 15;
const PTR_CONTINUE: u8 = 97;
const OFFSET_SUFFIX: u8 = 13;

/// Deepest nesting of builtin calls, indices and pointer dimensions
pub const MAX_EXPR_DEPTH: usize = 256;

const ARRAY8: u8 = 16;
const VAR16: u8 = 17;
const VAR8: u8 = 18;
const IMM32: u8 = 19;
const IMM16: u8 = 20;
const IMM8: u8 = 21;
const STRING: u8 = 22;
const VAR32: u8 = 23;
const VAR32_ALT: u8 = 24;
const ADDR8: u8 = 25;
const ARRAY32: u8 = 26;
const ARRAY16: u8 = 27;
const ADDR_ARRAY8: u8 = 28;
const FUNC: u8 = 29;

/// Tokens that can start an lvalue inside inline print text
pub const LVALUE_TOKENS: [u8; 9] = [16, 17, 18, 23, 24, 25, 26, 27, 28];

/// Well-known variable offsets and the names they are printed with
const NAMED_VARIABLES: &[(&str, &str)] = &[("var8_4931", "g_Language")];

fn operator(token: u8) -> Option<&'static str> {
    match token {
        1 => Some("-"),
        2 => Some("+"),
        3 => Some("-"),
        4 => Some("|"),
        5 => Some("*"),
        6 => Some("/"),
        7 => Some("%"),
        8 => Some("&"),
        9 => Some("("),
        10 => Some(")"),
        11 => Some("!"),
        30 => Some("||"),
        31 => Some("&&"),
        32 => Some("<"),
        33 => Some("<="),
        34 => Some(">"),
        35 => Some(">="),
        36 => Some("=="),
        37 => Some("!="),
        _ => None,
    }
}

fn builtin_name(code: u8) -> &'static str {
    match code {
        0 | 1 | 6 => "sqrt",
        5 => "sqr",
        7 => "abs",
        10 => "rand",
        _ => "id",
    }
}

fn substitute_names(text: &str) -> String {
    NAMED_VARIABLES
        .iter()
        .fold(text.to_string(), |acc, (from, to)| acc.replace(from, to))
}

/// Readability heuristic: anything with a space in it gets parenthesised
fn paren(text: String) -> String {
    if text.contains(' ') {
        format!("({})", text)
    } else {
        text
    }
}

fn peek_is(cur: &ByteCursor, value: u8) -> bool {
    matches!(cur.peek_u8(), Ok(b) if b == value)
}

/// Decode an expression terminated by the default end marker
pub fn read_expr(cur: &mut ByteCursor) -> Result<String> {
    read_expr_until(cur, END_EXPR)
}

/// Decode an expression terminated by `stop`
pub fn read_expr_until(cur: &mut ByteCursor, stop: u8) -> Result<String> {
    decode_expr(cur, stop, 0).map(paren)
}

fn decode_expr(cur: &mut ByteCursor, stop: u8, depth: usize) -> Result<String> {
    if depth > MAX_EXPR_DEPTH {
        return Err(DecompileError::ExpressionTooDeep {
            offset: cur.position(),
            limit: MAX_EXPR_DEPTH,
        });
    }
    let mut nesting: i32 = 0;
    let mut expr = String::new();

    loop {
        let mut token = cur.read_u8()?;
        while token == PTR_FIXED || token == PTR_INDEXED {
            let (text, _) = read_indirection(cur, token, depth)?;
            expr.push_str(&text);
            token = cur.read_u8()?;
        }

        match token {
            ARRAY8..=FUNC => read_operand(cur, token, &mut expr, depth)?,
            INDEX_END => {
                expr.push('}');
                if stop != INDEX_END {
                    warn!(
                        "closing index token without opening at offset {}",
                        cur.position() - 1
                    );
                }
            }
            END_EXPR => {}
            _ => match operator(token) {
                Some(symbol) => {
                    expr.push(' ');
                    expr.push_str(symbol);
                    expr.push(' ');
                }
                None => {
                    warn!(
                        "unknown expression token {} at offset {}, skipping to {}",
                        token,
                        cur.position() - 1,
                        stop
                    );
                    while cur.read_u8()? != stop {}
                    expr.push_str(&format!("<unknown operator {}", token));
                    return Ok(expr);
                }
            },
        }

        if token == GROUP_OPEN {
            nesting += 1;
            continue;
        }
        if token == GROUP_CLOSE {
            nesting -= 1;
        } else if operator(token).is_some() {
            continue;
        }

        if token == stop && (stop != GROUP_CLOSE || nesting < 0) {
            return Ok(substitute_names(&expr));
        }
    }
}

fn read_operand(cur: &mut ByteCursor, token: u8, expr: &mut String, depth: usize) -> Result<()> {
    match token {
        VAR16 => expr.push_str(&format!("var16_{}", cur.read_u16()? as u32 * 2)),
        VAR8 => expr.push_str(&format!("var8_{}", cur.read_u16()?)),
        IMM32 => expr.push_str(&cur.read_u32()?.to_string()),
        IMM16 => expr.push_str(&cur.read_u16()?.to_string()),
        IMM8 => expr.push_str(&cur.read_u8()?.to_string()),
        STRING => expr.push_str(&format!("\"{}\"", cur.read_cstr()?)),
        VAR32 | VAR32_ALT => expr.push_str(&format!("var32_{}", cur.read_u16()? as u32 * 4)),
        ADDR8 => {
            expr.push_str(&format!("(&var8_{})", cur.read_u16()? as u32 * 4));
            expr.push_str(&read_offset_suffix(cur, depth)?);
        }
        ARRAY8 | ARRAY32 | ARRAY16 | ADDR_ARRAY8 => {
            let index = cur.read_u16()? as u32;
            match token {
                ARRAY8 => expr.push_str(&format!("var8_{}[", index)),
                ARRAY32 => expr.push_str(&format!("var32_{}[", index * 4)),
                ARRAY16 => expr.push_str(&format!("var16_{}[", index * 2)),
                _ => expr.push_str(&format!("(&var8_{}[", index * 4)),
            }
            expr.push_str(&read_dimensions(cur, depth)?);
            if token == ADDR_ARRAY8 {
                expr.push(')');
                expr.push_str(&read_offset_suffix(cur, depth)?);
            }
        }
        FUNC => {
            let name = builtin_name(cur.read_u8()?);
            expr.push_str(name);
            expr.push_str("( ");
            expr.push_str(&decode_expr(cur, GROUP_CLOSE, depth + 1)?);
        }
        _ => unreachable!("operand token out of range: {}", token),
    }
    Ok(())
}

/// Dimension list of an indexed access, rendered up to and including the closing bracket
fn read_dimensions(cur: &mut ByteCursor, depth: usize) -> Result<String> {
    let dim_count = cur.read_u8()? as usize;
    let extents = cur.read_exact(dim_count)?;
    let mut text = String::new();
    for (dim, extent) in extents.iter().enumerate() {
        text.push_str(&decode_expr(cur, INDEX_END, depth + 1)?);
        text.push_str(&format!(" of {}", extent));
        if dim + 1 < dim_count {
            text.push_str("][");
        }
    }
    text.push(']');
    Ok(text)
}

fn read_offset_suffix(cur: &mut ByteCursor, depth: usize) -> Result<String> {
    if !peek_is(cur, OFFSET_SUFFIX) {
        return Ok(String::new());
    }
    cur.skip(1)?;
    Ok(format!("+{{*{}", decode_expr(cur, INDEX_END, depth + 1)?))
}

/// Two-token pointer prefix; the flag tells whether the continuation marker followed
fn read_indirection(cur: &mut ByteCursor, token: u8, depth: usize) -> Result<(String, bool)> {
    let mut text = format!("#{}", cur.read_u16()? as u32 * 4);
    if token == PTR_FIXED {
        text.push('#');
        cur.skip(2)?;
    } else {
        text.push_str("->");
        cur.skip(2)?;
        let dim_count = cur.read_u8()? as usize;
        cur.skip(dim_count)?;
        for _ in 0..dim_count {
            text.push_str(&decode_expr(cur, INDEX_END, depth + 1)?);
            text.push_str("->");
        }
        text.push('#');
    }

    let continues = peek_is(cur, PTR_CONTINUE);
    if continues {
        cur.skip(1)?;
    }
    Ok((text, continues))
}

/// Decode an lvalue reference
///
/// Only address-like tokens are accepted. A pointer prefix without its
/// continuation marker yields an empty reference; any other token yields
/// the `var_0` placeholder.
pub fn read_var_index(cur: &mut ByteCursor) -> Result<String> {
    let mut prefix = String::new();
    let mut token = cur.read_u8()?;
    while token == PTR_FIXED || token == PTR_INDEXED {
        let (text, continues) = read_indirection(cur, token, 0)?;
        prefix.push_str(&text);
        if !continues {
            return Ok(String::new());
        }
        token = cur.read_u8()?;
    }

    let mut expr = match token {
        ARRAY8 | VAR8 | ADDR8 | ADDR_ARRAY8 => "var8_",
        VAR16 | VAR32_ALT | ARRAY16 => "var16_",
        VAR32 | ARRAY32 => "var32_",
        _ => "",
    }
    .to_string();
    expr.push_str(&prefix);

    match token {
        VAR32 | VAR32_ALT | ADDR8 => {
            expr.push_str(&(cur.read_u16()? as u32 * 4).to_string());
            if token == ADDR8 {
                expr.push_str(&read_offset_suffix(cur, 0)?);
            }
        }
        VAR16 => expr.push_str(&(cur.read_u16()? as u32 * 2).to_string()),
        VAR8 => expr.push_str(&cur.read_u16()?.to_string()),
        ARRAY8 | ARRAY32 | ARRAY16 | ADDR_ARRAY8 => {
            let scale = match token {
                ARRAY8 => 1,
                ARRAY16 => 2,
                _ => 4,
            };
            expr.push_str(&format!("{}[", cur.read_u16()? as u32 * scale));
            expr.push_str(&read_dimensions(cur, 0)?);
            if token == ADDR_ARRAY8 {
                expr.push_str(&read_offset_suffix(cur, 0)?);
            }
        }
        _ => expr.push_str("var_0"),
    }

    Ok(paren(substitute_names(&expr)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(bytes: &[u8]) -> (String, usize) {
        let mut cur = ByteCursor::new(bytes);
        let text = read_expr(&mut cur).unwrap();
        (text, cur.position())
    }

    #[test]
    fn test_immediates_and_operators() {
        // 5 + var16_4
        let (text, pos) = expr(&[21, 5, 2, 17, 2, 0, 99]);
        assert_eq!(text, "(5 + var16_4)");
        assert_eq!(pos, 7);
    }

    #[test]
    fn test_scaled_variables() {
        assert_eq!(expr(&[18, 7, 0, 99]).0, "var8_7");
        assert_eq!(expr(&[17, 7, 0, 99]).0, "var16_14");
        assert_eq!(expr(&[23, 7, 0, 99]).0, "var32_28");
        assert_eq!(expr(&[24, 7, 0, 99]).0, "var32_28");
    }

    #[test]
    fn test_wide_immediates_and_strings() {
        assert_eq!(expr(&[19, 0x40, 0x42, 0x0f, 0x00, 99]).0, "1000000");
        assert_eq!(expr(&[20, 0x39, 0x05, 99]).0, "1337");
        assert_eq!(expr(&[22, b'A', b'B', 0, 99]).0, "\"AB\"");
    }

    #[test]
    fn test_grouping_close_stops_right_after_token() {
        // ( 1 + 2 ) ) -- the second close ends a stop=GROUP_CLOSE decode
        let bytes = [9, 21, 1, 2, 21, 2, 10, 10, 0xAA];
        let mut cur = ByteCursor::new(&bytes);
        let text = read_expr_until(&mut cur, GROUP_CLOSE).unwrap();
        assert_eq!(cur.position(), 8);
        assert_eq!(cur.peek_u8().unwrap(), 0xAA);
        assert_eq!(text, "( ( 1 + 2 )  ) )");
    }

    #[test]
    fn test_builtin_call() {
        let (text, pos) = expr(&[29, 7, 18, 3, 0, 10, 99]);
        assert_eq!(text, "(abs( var8_3 ) )");
        assert_eq!(pos, 7);
        assert_eq!(expr(&[29, 42, 21, 1, 10, 99]).0, "(id( 1 ) )");
    }

    #[test]
    fn test_array_access() {
        // var8_5[var16_2} of 3]
        let (text, pos) = expr(&[16, 5, 0, 1, 3, 17, 1, 0, 12, 99]);
        assert_eq!(text, "(var8_5[var16_2} of 3])");
        assert_eq!(pos, 10);
    }

    #[test]
    fn test_two_dimensional_array() {
        let bytes = [27, 1, 0, 2, 4, 5, 21, 1, 12, 21, 2, 12, 99];
        assert_eq!(expr(&bytes).0, "(var16_2[1} of 4][2} of 5])");
    }

    #[test]
    fn test_named_variable_substitution() {
        // 4931 = 0x1343
        assert_eq!(expr(&[18, 0x43, 0x13, 99]).0, "g_Language");
        let mut cur = ByteCursor::new(&[18, 0x43, 0x13]);
        assert_eq!(read_var_index(&mut cur).unwrap(), "g_Language");
    }

    #[test]
    fn test_unknown_token_skips_to_stop() {
        let bytes = [21, 1, 2, 0x50, 0x11, 0x22, 99, 0xAA];
        let mut cur = ByteCursor::new(&bytes);
        let text = read_expr(&mut cur).unwrap();
        assert_eq!(text, "(1 + <unknown operator 80)");
        assert_eq!(cur.position(), 7);
    }

    #[test]
    fn test_pointer_prefix() {
        // #8# prefix followed by the continuation marker then var8_1
        let bytes = [14, 2, 0, 0, 0, 97, 18, 1, 0, 99];
        assert_eq!(expr(&bytes).0, "#8#var8_1");

        let mut cur = ByteCursor::new(&bytes[..9]);
        assert_eq!(read_var_index(&mut cur).unwrap(), "var8_#8#1");
    }

    #[test]
    fn test_var_index_without_continuation_is_empty() {
        let bytes = [14, 2, 0, 0, 0, 18];
        let mut cur = ByteCursor::new(&bytes);
        assert_eq!(read_var_index(&mut cur).unwrap(), "");
        assert_eq!(cur.position(), 5);
    }

    #[test]
    fn test_var_index_forms() {
        let mut cur = ByteCursor::new(&[23, 3, 0]);
        assert_eq!(read_var_index(&mut cur).unwrap(), "var32_12");
        let mut cur = ByteCursor::new(&[24, 3, 0]);
        assert_eq!(read_var_index(&mut cur).unwrap(), "var16_12");
        let mut cur = ByteCursor::new(&[17, 3, 0]);
        assert_eq!(read_var_index(&mut cur).unwrap(), "var16_6");
        let mut cur = ByteCursor::new(&[26, 3, 0, 1, 9, 21, 4, 12]);
        assert_eq!(read_var_index(&mut cur).unwrap(), "(var32_12[4} of 9])");
    }

    #[test]
    fn test_var_index_placeholder_for_non_address() {
        let mut cur = ByteCursor::new(&[21, 3]);
        assert_eq!(read_var_index(&mut cur).unwrap(), "var_0");
        assert_eq!(cur.position(), 1);
    }

    #[test]
    fn test_address_with_offset_suffix() {
        let bytes = [25, 1, 0, 13, 21, 6, 12, 99];
        assert_eq!(expr(&bytes).0, "(&var8_4)+{*6}");
    }

    #[test]
    fn test_nested_builtin_calls_are_bounded() {
        let bytes: Vec<u8> = [FUNC, 0].repeat(30_000);
        let mut cur = ByteCursor::new(&bytes);
        let err = read_expr(&mut cur).unwrap_err();
        assert_eq!(
            err,
            DecompileError::ExpressionTooDeep {
                offset: (MAX_EXPR_DEPTH + 1) * 2,
                limit: MAX_EXPR_DEPTH,
            }
        );
    }

    #[test]
    fn test_nested_indices_are_bounded() {
        // var8_0[ var8_0[ ... as deep as the bytes go
        let bytes: Vec<u8> = [ARRAY8, 0, 0, 1, 1].repeat(1_000);
        let mut cur = ByteCursor::new(&bytes);
        assert!(matches!(
            read_var_index(&mut cur),
            Err(DecompileError::ExpressionTooDeep { .. })
        ));
    }

    #[test]
    fn test_truncated_expression_is_fatal() {
        let mut cur = ByteCursor::new(&[21, 1, 2]);
        assert!(read_expr(&mut cur).is_err());
    }
}
