//! Syntax-preserving rewrites of formula source text
//!
//! When a field is renamed, every formula referencing it must be updated
//! without disturbing anything else the user wrote. These rewrites work on
//! the raw token stream instead of the AST: only the string-literal spans
//! being renamed are replaced, so whitespace, comments, operator spelling
//! and quote style all survive byte for byte.

use std::collections::HashMap;

use gridbase_core::FieldId;

use crate::error::FormulaResult;
use crate::parser::{Lexer, Token, TokenKind};

/// Rewrite `field('old')` references in `source` according to `renames`.
///
/// With `via` set to a link field name, only the second argument of
/// `lookup(via, ...)` calls is rewritten; this is used when a field in the
/// *related* table is renamed and formulas reach it through that link.
/// With `via` unset, plain `field(...)` arguments and the first argument of
/// every `lookup(...)` call are rewritten.
pub fn rename_field_references(
    source: &str,
    renames: &HashMap<String, String>,
    via: Option<&str>,
) -> FormulaResult<String> {
    let tokens = Lexer::tokenize(source)?;
    let mut replacements: Vec<(usize, usize, String)> = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        let TokenKind::Identifier(ident) = &token.kind else {
            continue;
        };
        if ident.eq_ignore_ascii_case("field") && via.is_none() {
            // field ( 'name' )
            if let [link] = string_args(&tokens[i + 1..], 1).as_slice() {
                push_rename(source, link, renames, &mut replacements);
            }
        } else if ident.eq_ignore_ascii_case("lookup") {
            // lookup ( 'link' , 'target' )
            if let [link, target] = string_args(&tokens[i + 1..], 2).as_slice() {
                match via {
                    None => push_rename(source, link, renames, &mut replacements),
                    Some(v) => {
                        if let TokenKind::String(name) = &link.kind {
                            if name == v {
                                push_rename(source, target, renames, &mut replacements);
                            }
                        }
                    }
                }
            }
        }
    }

    Ok(apply(source, replacements))
}

/// Rewrite legacy `field_by_id(N)` calls into `field('name')` references
/// using the given id-to-name map. Ids missing from the map are left alone.
pub fn replace_field_by_id(
    source: &str,
    names: &HashMap<FieldId, String>,
) -> FormulaResult<String> {
    let tokens = Lexer::tokenize(source)?;
    let mut replacements: Vec<(usize, usize, String)> = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        let TokenKind::Identifier(ident) = &token.kind else {
            continue;
        };
        if !ident.eq_ignore_ascii_case("field_by_id") {
            continue;
        }
        // field_by_id ( N )
        let rest = &tokens[i + 1..];
        if rest.len() < 3 {
            continue;
        }
        if rest[0].kind != TokenKind::LeftParen || rest[2].kind != TokenKind::RightParen {
            continue;
        }
        let TokenKind::Number(text) = &rest[1].kind else {
            continue;
        };
        let Ok(id) = text.parse::<u64>() else {
            continue;
        };
        if let Some(name) = names.get(&FieldId(id)) {
            replacements.push((
                token.start,
                rest[2].end,
                format!("field('{}')", escape_for('\'', name)),
            ));
        }
    }

    Ok(apply(source, replacements))
}

/// Match a parenthesized run of exactly `count` comma-separated string
/// literals, returning the string tokens.
fn string_args(rest: &[Token], count: usize) -> Vec<Token> {
    let mut out = Vec::with_capacity(count);
    let mut iter = rest.iter();
    if !matches!(iter.next().map(|t| &t.kind), Some(TokenKind::LeftParen)) {
        return Vec::new();
    }
    for i in 0..count {
        if i > 0 && !matches!(iter.next().map(|t| &t.kind), Some(TokenKind::Comma)) {
            return Vec::new();
        }
        match iter.next() {
            Some(t @ Token {
                kind: TokenKind::String(_),
                ..
            }) => out.push(t.clone()),
            _ => return Vec::new(),
        }
    }
    if !matches!(iter.next().map(|t| &t.kind), Some(TokenKind::RightParen)) {
        return Vec::new();
    }
    out
}

fn push_rename(
    source: &str,
    token: &Token,
    renames: &HashMap<String, String>,
    replacements: &mut Vec<(usize, usize, String)>,
) {
    let TokenKind::String(name) = &token.kind else {
        return;
    };
    if let Some(new_name) = renames.get(name) {
        // Keep the quote style the user wrote.
        let quote = source[token.start..].chars().next().unwrap_or('\'');
        replacements.push((
            token.start,
            token.end,
            format!("{}{}{}", quote, escape_for(quote, new_name), quote),
        ));
    }
}

fn escape_for(quote: char, s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == quote || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn apply(source: &str, mut replacements: Vec<(usize, usize, String)>) -> String {
    replacements.sort_by_key(|(start, _, _)| *start);
    let mut out = String::with_capacity(source.len());
    let mut pos = 0;
    for (start, end, text) in replacements {
        out.push_str(&source[pos..start]);
        out.push_str(&text);
        pos = end;
    }
    out.push_str(&source[pos..]);
    out
}
