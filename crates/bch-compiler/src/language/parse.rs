//! The CashAssembly parser.
//!
//! A hand-written recursive descent parser over the source text. Every
//! alternative that fails records what it expected at the offset where it
//! failed; when the whole parse fails, the expectations recorded at the
//! furthest offset become the diagnostic.

use crate::language::types::{NodeKind, ParseFailure, ScriptNode, ScriptSegment, SourcePosition};

const EXPECT_SINGLE_LINE_COMMENT: &str = "the start of a single-line comment ('//')";
const EXPECT_MULTI_LINE_COMMENT: &str = "the start of a multi-line comment ('/*')";
const EXPECT_MULTI_LINE_COMMENT_END: &str = "the end of this multi-line comment ('*/')";
const EXPECT_PUSH: &str = "the start of a push statement ('<')";
const EXPECT_PUSH_END: &str = "the end of this push statement ('>')";
const EXPECT_EVALUATION: &str = "the start of an evaluation ('$')";
const EXPECT_EVALUATION_OPEN: &str = "the opening parenthesis of this evaluation ('(')";
const EXPECT_EVALUATION_CLOSE: &str = "the closing parenthesis of this evaluation (')')";
const EXPECT_DOUBLE_QUOTE: &str = "a double quote (\")";
const EXPECT_CLOSING_DOUBLE_QUOTE: &str = "a closing double quote (\")";
const EXPECT_SINGLE_QUOTE: &str = "a single quote (')";
const EXPECT_CLOSING_SINGLE_QUOTE: &str = "a closing single quote (')";
const EXPECT_HEX: &str = "a hex literal ('0x...')";
const EXPECT_HEX_DIGITS: &str = "a valid hexadecimal string";
const EXPECT_BINARY: &str = "a binary literal ('0b...')";
const EXPECT_BINARY_DIGITS: &str = "a valid binary string";
const EXPECT_INTEGER: &str = "an integer literal";
const EXPECT_IDENTIFIER: &str = "a valid identifier";
const EXPECT_EOF: &str = "EOF";

/// Parse a CashAssembly script.
///
/// # Returns
/// The script's parse tree, or the furthest failure with the sorted,
/// de-duplicated list of expectations at that position. `"EOF"` in the
/// list means the script could also have ended there.
pub fn parse_script(script: &str) -> Result<ScriptSegment, ParseFailure> {
    let mut parser = Parser::new(script);
    let (segment, end) = parser.script(0);
    if end == script.len() {
        return Ok(segment);
    }
    parser.fail(end, EXPECT_EOF);
    Err(parser.into_failure())
}

/// Format the expectations of a [`ParseFailure`] as a sentence.
///
/// `"EOF"` is replaced by "the end of the script", which always comes last.
pub fn describe_expected_input(expected: &[String]) -> String {
    let mut items: Vec<&str> = expected
        .iter()
        .map(String::as_str)
        .filter(|item| *item != EXPECT_EOF)
        .collect();
    if items.len() != expected.len() {
        items.push("the end of the script");
    }
    let description = match items.as_slice() {
        [] => String::new(),
        [only] => (*only).to_string(),
        [first, second] => format!("{} or {}", first, second),
        [init @ .., last] => format!("{}, or {}", init.join(", "), last),
    };
    format!(
        "Encountered unexpected input while parsing script. Expected {}.",
        description
    )
}

struct Parser<'src> {
    source: &'src str,
    line_starts: Vec<usize>,
    furthest: usize,
    expected: Vec<&'static str>,
}

impl<'src> Parser<'src> {
    fn new(source: &'src str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(index, _)| index + 1));
        Parser {
            source,
            line_starts,
            furthest: 0,
            expected: Vec::new(),
        }
    }

    fn position(&self, offset: usize) -> SourcePosition {
        let line_index = match self.line_starts.binary_search(&offset) {
            Ok(index) => index,
            Err(index) => index.saturating_sub(1),
        };
        let line_start = self.line_starts.get(line_index).copied().unwrap_or(0);
        let column = self.source.get(line_start..offset).map_or(0, |text| text.chars().count());
        SourcePosition {
            line: line_index + 1,
            column: column + 1,
            offset,
        }
    }

    fn fail(&mut self, at: usize, description: &'static str) {
        if at > self.furthest {
            self.furthest = at;
            self.expected.clear();
        }
        if at == self.furthest {
            self.expected.push(description);
        }
    }

    fn into_failure(self) -> ParseFailure {
        let mut expected: Vec<String> = self.expected.iter().map(|item| item.to_string()).collect();
        expected.sort();
        expected.dedup();
        ParseFailure {
            expected,
            position: self.position(self.furthest),
        }
    }

    fn rest(&self, at: usize) -> &'src str {
        self.source.get(at..).unwrap_or("")
    }

    fn literal(&mut self, at: usize, text: &str, description: &'static str) -> Option<usize> {
        if self.rest(at).starts_with(text) {
            Some(at + text.len())
        } else {
            self.fail(at, description);
            None
        }
    }

    fn skip_whitespace(&self, at: usize) -> usize {
        let rest = self.rest(at);
        at + rest.len() - rest.trim_start().len()
    }

    // -------------------------------------------------------------------
    // Grammar
    // -------------------------------------------------------------------

    /// Leading whitespace, expressions separated by optional whitespace,
    /// then trailing whitespace. Never fails.
    fn script(&mut self, at: usize) -> (ScriptSegment, usize) {
        let start = self.skip_whitespace(at);
        let mut children = Vec::new();
        let mut end = start;
        if let Some((node, next)) = self.expression(start) {
            children.push(node);
            end = next;
            while let Some((node, next)) = self.expression(self.skip_whitespace(end)) {
                children.push(node);
                end = next;
            }
        }
        let segment = ScriptSegment {
            start: self.position(start),
            end: self.position(end),
            children,
        };
        (segment, self.skip_whitespace(end))
    }

    fn expression(&mut self, at: usize) -> Option<(ScriptNode, usize)> {
        let (kind, end) = self
            .comment(at)
            .or_else(|| self.push(at))
            .or_else(|| self.evaluation(at))
            .or_else(|| self.utf8(at))
            .or_else(|| self.hex(at))
            .or_else(|| self.binary(at))
            .or_else(|| self.bigint(at))
            .or_else(|| self.identifier(at))?;
        let node = ScriptNode {
            start: self.position(at),
            end: self.position(end),
            kind,
        };
        Some((node, end))
    }

    fn comment(&mut self, at: usize) -> Option<(NodeKind, usize)> {
        if let Some(body) = self.literal(at, "//", EXPECT_SINGLE_LINE_COMMENT) {
            let end = self.rest(body).find('\n').map_or(self.source.len(), |length| body + length);
            let text = self.source.get(body..end).unwrap_or("").trim();
            return Some((NodeKind::Comment(text.to_string()), end));
        }
        let body = self.literal(at, "/*", EXPECT_MULTI_LINE_COMMENT)?;
        match self.rest(body).find("*/") {
            Some(length) => {
                let text = self.rest(body).get(..length).unwrap_or("").trim();
                Some((NodeKind::Comment(text.to_string()), body + length + 2))
            }
            None => {
                self.fail(body, EXPECT_MULTI_LINE_COMMENT_END);
                None
            }
        }
    }

    fn push(&mut self, at: usize) -> Option<(NodeKind, usize)> {
        let inner = self.literal(at, "<", EXPECT_PUSH)?;
        let (segment, after) = self.script(inner);
        let end = self.literal(after, ">", EXPECT_PUSH_END)?;
        Some((NodeKind::Push(segment), end))
    }

    fn evaluation(&mut self, at: usize) -> Option<(NodeKind, usize)> {
        let open = self.literal(at, "$", EXPECT_EVALUATION)?;
        let inner = self.literal(open, "(", EXPECT_EVALUATION_OPEN)?;
        let (segment, after) = self.script(inner);
        let end = self.literal(after, ")", EXPECT_EVALUATION_CLOSE)?;
        Some((NodeKind::Evaluation(segment), end))
    }

    fn utf8(&mut self, at: usize) -> Option<(NodeKind, usize)> {
        self.quoted(at, "\"", EXPECT_DOUBLE_QUOTE, EXPECT_CLOSING_DOUBLE_QUOTE)
            .or_else(|| self.quoted(at, "'", EXPECT_SINGLE_QUOTE, EXPECT_CLOSING_SINGLE_QUOTE))
    }

    fn quoted(
        &mut self,
        at: usize,
        quote: &str,
        open: &'static str,
        close: &'static str,
    ) -> Option<(NodeKind, usize)> {
        let body = self.literal(at, quote, open)?;
        let content_end = body + self.rest(body).find(quote).unwrap_or(self.rest(body).len());
        let end = self.literal(content_end, quote, close)?;
        let text = self.source.get(body..content_end).unwrap_or("");
        Some((NodeKind::Utf8Literal(text.to_string()), end))
    }

    fn hex(&mut self, at: usize) -> Option<(NodeKind, usize)> {
        let digits = self.literal(at, "0x", EXPECT_HEX)?;
        let end = match_separated_digits(self.source.as_bytes(), digits, 2, |byte| byte.is_ascii_hexdigit());
        if end == digits {
            self.fail(digits, EXPECT_HEX_DIGITS);
            return None;
        }
        let text = self.source.get(digits..end).unwrap_or("");
        Some((NodeKind::HexLiteral(text.to_string()), end))
    }

    fn binary(&mut self, at: usize) -> Option<(NodeKind, usize)> {
        let digits = self.literal(at, "0b", EXPECT_BINARY)?;
        let end = match_separated_digits(self.source.as_bytes(), digits, 1, |byte| byte == b'0' || byte == b'1');
        if end == digits {
            self.fail(digits, EXPECT_BINARY_DIGITS);
            return None;
        }
        let text = self.source.get(digits..end).unwrap_or("");
        Some((NodeKind::BinaryLiteral(text.to_string()), end))
    }

    fn bigint(&mut self, at: usize) -> Option<(NodeKind, usize)> {
        let bytes = self.source.as_bytes();
        let digits = if bytes.get(at) == Some(&b'-') { at + 1 } else { at };
        let end = match_separated_digits(bytes, digits, 1, |byte| byte.is_ascii_digit());
        if end == digits {
            self.fail(at, EXPECT_INTEGER);
            return None;
        }
        let text = self.source.get(at..end).unwrap_or("");
        Some((NodeKind::BigIntLiteral(text.to_string()), end))
    }

    fn identifier(&mut self, at: usize) -> Option<(NodeKind, usize)> {
        let bytes = self.source.as_bytes();
        match bytes.get(at) {
            Some(byte) if byte.is_ascii_alphabetic() || *byte == b'_' => {}
            _ => {
                self.fail(at, EXPECT_IDENTIFIER);
                return None;
            }
        }
        let length = bytes[at + 1..]
            .iter()
            .take_while(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-'))
            .count();
        let end = at + 1 + length;
        let text = self.source.get(at..end).unwrap_or("");
        Some((NodeKind::Identifier(text.to_string()), end))
    }
}

/// Match digits separated by runs of `_`, in groups of `group` digits.
///
/// Underscores may only appear between two digits. Returns the end of the
/// longest match made of whole groups, or `at` if there is none.
fn match_separated_digits(bytes: &[u8], at: usize, group: usize, is_digit: impl Fn(u8) -> bool) -> usize {
    let mut position = at;
    let mut count = 0;
    let mut matched = at;
    loop {
        let mut next = position;
        if count > 0 {
            while bytes.get(next) == Some(&b'_') {
                next += 1;
            }
        }
        match bytes.get(next) {
            Some(byte) if is_digit(*byte) => {
                count += 1;
                position = next + 1;
                if count % group == 0 {
                    matched = position;
                }
            }
            _ => return matched,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(script: &str) -> Vec<NodeKind> {
        parse_script(script)
            .unwrap()
            .children
            .into_iter()
            .map(|node| node.kind)
            .collect()
    }

    fn identifier(name: &str) -> NodeKind {
        NodeKind::Identifier(name.to_string())
    }

    #[test]
    fn test_parse_push() {
        let script = parse_script("<0x51>").unwrap();
        assert_eq!(script.children.len(), 1);
        let push = &script.children[0];
        assert_eq!(push.start.column, 1);
        assert_eq!(push.end.column, 7);
        match &push.kind {
            NodeKind::Push(inner) => {
                assert_eq!(inner.children[0].kind, NodeKind::HexLiteral("51".to_string()));
                assert_eq!(inner.children[0].start.column, 2);
            }
            other => panic!("expected a push, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_positions_across_lines() {
        let script = parse_script("OP_1\n  OP_2 // two\n").unwrap();
        assert_eq!(script.children.len(), 3);
        let second = &script.children[1];
        assert_eq!((second.start.line, second.start.column), (2, 3));
        assert_eq!((second.end.line, second.end.column), (2, 7));
        assert_eq!(second.start.offset, 7);
        assert_eq!(script.children[2].kind, NodeKind::Comment("two".to_string()));
    }

    #[test]
    fn test_parse_literals() {
        let parsed = kinds("'a b' \"c\" 0b0000_0001 -1__000_000 $(<1>)");
        assert_eq!(
            parsed[..4],
            [
                NodeKind::Utf8Literal("a b".to_string()),
                NodeKind::Utf8Literal("c".to_string()),
                NodeKind::BinaryLiteral("0000_0001".to_string()),
                NodeKind::BigIntLiteral("-1__000_000".to_string()),
            ]
        );
        match &parsed[4] {
            NodeKind::Evaluation(inner) => {
                assert_eq!(inner.start.column, 37);
                assert!(matches!(inner.children[0].kind, NodeKind::Push(_)));
            }
            other => panic!("expected an evaluation, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_separator_edge_cases() {
        assert_eq!(
            kinds("0x0_11"),
            vec![NodeKind::HexLiteral("0_1".to_string()), NodeKind::BigIntLiteral("1".to_string())]
        );
        assert_eq!(kinds("0x0_1_"), vec![NodeKind::HexLiteral("0_1".to_string()), identifier("_")]);
        assert_eq!(kinds("0x"), vec![NodeKind::BigIntLiteral("0".to_string()), identifier("x")]);
        assert_eq!(kinds("0x_01"), vec![NodeKind::BigIntLiteral("0".to_string()), identifier("x_01")]);
        assert_eq!(kinds("0b1_"), vec![NodeKind::BinaryLiteral("1".to_string()), identifier("_")]);
        assert_eq!(kinds("1_"), vec![NodeKind::BigIntLiteral("1".to_string()), identifier("_")]);
    }

    #[test]
    fn test_parse_comments() {
        assert_eq!(
            kinds("/* first */ OP_1 /* second */"),
            vec![
                NodeKind::Comment("first".to_string()),
                identifier("OP_1"),
                NodeKind::Comment("second".to_string()),
            ]
        );
        let failure = parse_script("OP_1 /* open").unwrap_err();
        assert_eq!(failure.position.column, 8);
        assert!(failure.expected.contains(&EXPECT_MULTI_LINE_COMMENT_END.to_string()));
    }

    #[test]
    fn test_parse_empty_script() {
        let script = parse_script("  \n ").unwrap();
        assert!(script.children.is_empty());
        assert_eq!((script.start.line, script.start.column), (2, 2));
    }

    #[test]
    fn test_parse_failure_lists_every_expectation() {
        let failure = parse_script("-_1").unwrap_err();
        assert_eq!(failure.position, SourcePosition { line: 1, column: 1, offset: 0 });
        assert_eq!(
            failure.expected,
            vec![
                "EOF",
                "a binary literal ('0b...')",
                "a double quote (\")",
                "a hex literal ('0x...')",
                "a single quote (')",
                "a valid identifier",
                "an integer literal",
                "the start of a multi-line comment ('/*')",
                "the start of a push statement ('<')",
                "the start of a single-line comment ('//')",
                "the start of an evaluation ('$')",
            ]
        );
        assert_eq!(
            describe_expected_input(&failure.expected),
            "Encountered unexpected input while parsing script. Expected a binary literal ('0b...'), \
             a double quote (\"), a hex literal ('0x...'), a single quote ('), a valid identifier, \
             an integer literal, the start of a multi-line comment ('/*'), the start of a push \
             statement ('<'), the start of a single-line comment ('//'), the start of an evaluation \
             ('$'), or the end of the script."
        );
    }

    #[test]
    fn test_parse_unclosed_push() {
        let failure = parse_script("<1").unwrap_err();
        assert_eq!(failure.position.column, 3);
        assert_eq!(failure.expected.len(), 11);
        assert!(failure.expected.contains(&EXPECT_PUSH_END.to_string()));
        assert!(!failure.expected.contains(&EXPECT_EOF.to_string()));
    }

    #[test]
    fn test_parse_unclosed_evaluation() {
        let failure = parse_script("$<1>").unwrap_err();
        assert_eq!(failure.position.column, 2);
        assert_eq!(failure.expected, vec![EXPECT_EVALUATION_OPEN.to_string()]);
    }

    #[test]
    fn test_describe_expected_input() {
        assert_eq!(
            describe_expected_input(&["EOF".to_string()]),
            "Encountered unexpected input while parsing script. Expected the end of the script."
        );
        assert_eq!(
            describe_expected_input(&["EOF".to_string(), "a valid identifier".to_string()]),
            "Encountered unexpected input while parsing script. Expected a valid identifier or the end of the script."
        );
    }
}
