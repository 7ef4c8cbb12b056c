use thiserror::Error;

use crate::cursor::Cursor;

/// Number-format parse failure.
///
/// Callers treat a failed parse as "display with General": per-format syntax
/// errors are recovered locally and never abort a read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid number format: {reason}")]
pub struct FormatError {
    reason: &'static str,
}

impl FormatError {
    fn new(reason: &'static str) -> Self {
        Self { reason }
    }
}

/// Classification of one `;`-delimited format section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    General,
    Date,
    Duration,
    Text,
}

/// A single token of a format section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A run of `y`/`m`/`d`/`h`/`s`/`g` characters, lowercased (`"yyyy"`, `"mm"`).
    DatePart(String),
    /// A bracketed elapsed-time run such as `[h]` or `[mm]`, lowercased.
    ElapsedPart(String),
    /// `AM/PM` or `A/P`.
    AmPm,
    /// The literal word `General`.
    General,
    /// The text placeholder `@`.
    TextValue,
    /// A digit placeholder: `0`, `#` or `?`.
    Placeholder(char),
    /// The decimal point.
    DecimalPoint,
    /// Sub-second digits: a decimal point followed by a run of `0`, coalesced
    /// into one token (the count is the number of zeros).
    Milliseconds(u8),
    /// Scientific notation marker (`e+`, `E-`, …).
    Exponent,
    /// Literal output: quoted text, escaped characters, pad/fill operands and
    /// plain symbols.
    Literal(String),
    /// A run of whitespace.
    Whitespace(String),
}

/// One classified section of a format code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub kind: SectionKind,
    pub tokens: Vec<Token>,
}

/// A parsed number format code, split into up to four `;`-delimited sections
/// (`positive;negative;zero;text`, the documented Excel maximum; extra
/// sections are dropped).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatCode {
    sections: Vec<Section>,
}

impl FormatCode {
    pub fn parse(code: &str) -> Result<Self, FormatError> {
        let mut raw = split_sections(code);
        raw.truncate(4);

        let mut sections = Vec::with_capacity(raw.len());
        for section in &raw {
            let mut tokens = tokenize(section);
            coalesce_milliseconds(&mut tokens);
            let kind = classify(&tokens)?;
            sections.push(Section { kind, tokens });
        }
        Ok(Self { sections })
    }

    pub fn general() -> Self {
        Self {
            sections: vec![Section {
                kind: SectionKind::General,
                tokens: vec![Token::General],
            }],
        }
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// The section governing a numeric value.
    ///
    /// Sections mean `positive;negative;zero`; a value falls back to the first
    /// section when its own is absent.
    pub fn section_for_number(&self, value: f64) -> &Section {
        let count = self.sections.len();
        let idx = if value < 0.0 && count >= 2 {
            1
        } else if value == 0.0 && count >= 3 {
            2
        } else {
            0
        };
        &self.sections[idx]
    }

    /// The explicit text section (fourth), when present.
    pub fn section_for_text(&self) -> Option<&Section> {
        self.sections.get(3)
    }

    pub fn first_date_section(&self) -> Option<&Section> {
        self.sections.iter().find(|s| s.kind == SectionKind::Date)
    }
}

/// Split a format code on `;`, honouring quoted and escaped characters.
fn split_sections(code: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut chars = code.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                buf.push(c);
            }
            '\\' => {
                buf.push(c);
                if let Some(next) = chars.next() {
                    buf.push(next);
                }
            }
            ';' if !in_quotes => {
                sections.push(std::mem::take(&mut buf));
            }
            _ => buf.push(c),
        }
    }
    sections.push(buf);
    sections
}

const DATE_CHARS: [char; 6] = ['y', 'm', 'd', 'h', 's', 'g'];

fn tokenize(section: &str) -> Vec<Token> {
    let mut cur = Cursor::new(section);
    let mut tokens = Vec::new();

    while let Some(c) = cur.peek() {
        if c == '[' {
            match cur.eat_enclosed('[', ']') {
                Some(body) => {
                    if is_elapsed_body(&body) {
                        tokens.push(Token::ElapsedPart(body.to_ascii_lowercase()));
                    } else {
                        // Colors, conditions, currency/locale tags: literal
                        // from a classification standpoint.
                        tokens.push(Token::Literal(body));
                    }
                }
                None => {
                    cur.advance(1);
                    tokens.push(Token::Literal("[".to_string()));
                }
            }
            continue;
        }

        if cur.eat_literal("General", true) {
            tokens.push(Token::General);
            continue;
        }
        if cur.eat_literal("AM/PM", true) || cur.eat_literal("A/P", true) {
            tokens.push(Token::AmPm);
            continue;
        }

        if DATE_CHARS.contains(&c.to_ascii_lowercase()) {
            let start = cur.pos();
            let len = cur.eat_run_of(c);
            tokens.push(Token::DatePart(cur.slice(start, len).to_ascii_lowercase()));
            continue;
        }

        if let Some(placeholder) = cur.eat_any_of(&['0', '#', '?']) {
            tokens.push(Token::Placeholder(placeholder));
            continue;
        }

        match c {
            '.' => {
                cur.advance(1);
                tokens.push(Token::DecimalPoint);
            }
            'e' | 'E' => {
                if matches!(cur.peek_at(1), Some('+') | Some('-')) {
                    cur.advance(2);
                    tokens.push(Token::Exponent);
                } else {
                    cur.advance(1);
                    tokens.push(Token::Literal(c.to_string()));
                }
            }
            '\\' | '*' | '_' => {
                // Escaped character, fill operand, pad operand: one literal
                // character each. A dangling operator is dropped.
                cur.advance(1);
                if let Some(operand) = cur.take() {
                    tokens.push(Token::Literal(operand.to_string()));
                }
            }
            '"' => {
                cur.advance(1);
                let mut body = String::new();
                loop {
                    match cur.take() {
                        Some('"') | None => break,
                        Some(inner) => body.push(inner),
                    }
                }
                tokens.push(Token::Literal(body));
            }
            '@' => {
                cur.advance(1);
                tokens.push(Token::TextValue);
            }
            c if c.is_whitespace() => {
                let mut run = String::new();
                while let Some(ws) = cur.peek() {
                    if !ws.is_whitespace() {
                        break;
                    }
                    run.push(ws);
                    cur.advance(1);
                }
                tokens.push(Token::Whitespace(run));
            }
            other => {
                cur.advance(1);
                tokens.push(Token::Literal(other.to_string()));
            }
        }
    }

    tokens
}

fn is_elapsed_body(body: &str) -> bool {
    !body.is_empty()
        && (body.chars().all(|c| c.eq_ignore_ascii_case(&'h'))
            || body.chars().all(|c| c.eq_ignore_ascii_case(&'m'))
            || body.chars().all(|c| c.eq_ignore_ascii_case(&'s')))
}

/// Coalesce a decimal point followed by a run of `0` placeholders into a
/// single sub-second token. Only date/duration sections carry sub-seconds; in
/// plain numeric sections the dot keeps its decimal meaning.
fn coalesce_milliseconds(tokens: &mut Vec<Token>) {
    let is_temporal = tokens
        .iter()
        .any(|t| matches!(t, Token::DatePart(_) | Token::ElapsedPart(_)));
    if !is_temporal {
        return;
    }

    let mut out = Vec::with_capacity(tokens.len());
    let mut iter = tokens.drain(..).peekable();
    while let Some(token) = iter.next() {
        if token == Token::DecimalPoint {
            let mut zeros = 0u8;
            while iter.peek() == Some(&Token::Placeholder('0')) {
                iter.next();
                zeros = zeros.saturating_add(1);
            }
            if zeros > 0 {
                out.push(Token::Milliseconds(zeros));
                continue;
            }
        }
        out.push(token);
    }
    drop(iter);
    *tokens = out;
}

fn classify(tokens: &[Token]) -> Result<SectionKind, FormatError> {
    let mut has_date = false;
    let mut has_elapsed = false;
    let mut has_general = false;
    let mut has_text = false;
    let mut has_placeholder = false;
    let mut has_literal = false;

    for token in tokens {
        match token {
            Token::DatePart(_) | Token::AmPm => has_date = true,
            Token::ElapsedPart(_) => has_elapsed = true,
            Token::General => has_general = true,
            Token::TextValue => has_text = true,
            Token::Placeholder(_) | Token::DecimalPoint | Token::Exponent => {
                has_placeholder = true
            }
            Token::Milliseconds(_) => {}
            Token::Literal(_) => has_literal = true,
            Token::Whitespace(_) => {}
        }
    }

    if has_date && (has_general || has_text) {
        return Err(FormatError::new("date parts mixed with general/text"));
    }

    Ok(if has_elapsed {
        SectionKind::Duration
    } else if has_date {
        SectionKind::Date
    } else if has_general {
        SectionKind::General
    } else if has_text || (has_literal && !has_placeholder) {
        SectionKind::Text
    } else {
        SectionKind::General
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(code: &str) -> SectionKind {
        FormatCode::parse(code).unwrap().sections()[0].kind
    }

    #[test]
    fn plain_numeric_codes_are_general() {
        assert_eq!(kind("General"), SectionKind::General);
        assert_eq!(kind("0"), SectionKind::General);
        assert_eq!(kind("0.00"), SectionKind::General);
        assert_eq!(kind("#,##0.00"), SectionKind::General);
        assert_eq!(kind("0.00E+00"), SectionKind::General);
        assert_eq!(kind("0%"), SectionKind::General);
        assert_eq!(kind("$#,##0.00"), SectionKind::General);
        assert_eq!(kind(""), SectionKind::General);
    }

    #[test]
    fn date_codes_classify_as_date() {
        assert_eq!(kind("yyyy-mm-dd"), SectionKind::Date);
        assert_eq!(kind("m/d/yyyy"), SectionKind::Date);
        assert_eq!(kind("d-mmm-yy"), SectionKind::Date);
        assert_eq!(kind("h:mm AM/PM"), SectionKind::Date);
        assert_eq!(kind("hh:mm:ss"), SectionKind::Date);
        // Sub-second digits coalesce instead of reading as a decimal number.
        let code = FormatCode::parse("mm:ss.000").unwrap();
        assert_eq!(code.sections()[0].kind, SectionKind::Date);
        assert!(code.sections()[0]
            .tokens
            .iter()
            .any(|t| *t == Token::Milliseconds(3)));
    }

    #[test]
    fn bracketed_runs_classify_as_duration() {
        assert_eq!(kind("[h]:mm:ss"), SectionKind::Duration);
        assert_eq!(kind("[hh]:mm"), SectionKind::Duration);
        assert_eq!(kind("[mm]:ss"), SectionKind::Duration);
        // Color brackets are not elapsed markers.
        assert_eq!(kind("[Red]0.00"), SectionKind::General);
    }

    #[test]
    fn text_codes_classify_as_text() {
        assert_eq!(kind("@"), SectionKind::Text);
        assert_eq!(kind("\"approved\""), SectionKind::Text);
        assert_eq!(kind("\"x\" @"), SectionKind::Text);
        // A literal next to digit placeholders stays numeric.
        assert_eq!(kind("\"USD\" 0.00"), SectionKind::General);
    }

    #[test]
    fn mixing_date_with_text_is_a_syntax_error() {
        assert!(FormatCode::parse("yyyy@").is_err());
        assert!(FormatCode::parse("General dd").is_err());
    }

    #[test]
    fn sections_split_on_unquoted_semicolons_only() {
        let code = FormatCode::parse("0.00;\"a;b\";General").unwrap();
        assert_eq!(code.sections().len(), 3);
        assert_eq!(code.sections()[1].kind, SectionKind::Text);
    }

    #[test]
    fn extra_sections_are_dropped() {
        let code = FormatCode::parse("0;0;0;@;0;0").unwrap();
        assert_eq!(code.sections().len(), 4);
        assert_eq!(code.section_for_text().unwrap().kind, SectionKind::Text);
    }

    #[test]
    fn numeric_section_selection_follows_sign() {
        let code = FormatCode::parse("0.00;(0.00);\"-\"").unwrap();
        assert_eq!(code.section_for_number(1.5).kind, SectionKind::General);
        assert_eq!(code.section_for_number(-1.5).kind, SectionKind::General);
        assert_eq!(code.section_for_number(0.0).kind, SectionKind::Text);

        let single = FormatCode::parse("yyyy-mm-dd").unwrap();
        assert_eq!(single.section_for_number(-3.0).kind, SectionKind::Date);
    }

    #[test]
    fn date_sections_are_discoverable_for_instants() {
        let code = FormatCode::parse("0.00;d-mmm-yy").unwrap();
        assert_eq!(
            code.first_date_section().map(|s| s.kind),
            Some(SectionKind::Date)
        );
        assert_eq!(FormatCode::parse("0.00").unwrap().first_date_section(), None);
        assert!(FormatCode::general().section_for_text().is_none());
    }

    #[test]
    fn reparsing_is_deterministic() {
        let a = FormatCode::parse("[h]:mm:ss;@").unwrap();
        let b = FormatCode::parse("[h]:mm:ss;@").unwrap();
        assert_eq!(a, b);
    }
}
