//! Scanner for the free-text device log.
//!
//! The log is tokenized once and records are recognised on the token stream:
//!
//! ```text
//! detection := '[' "score" ':' num ',' "x1" ':' int ',' "y1" ':' int ','
//!                  "x2" ':' int ',' "y2" ':' int ']'
//! landmarks := ['['] pair ',' pair ',' pair ',' pair ',' pair [']']
//! pair      := name ':' '[' int ',' int ']'
//! name      := left_eye | right_eye | nose | left_mouth | right_mouth
//! ```
//!
//! Anything that is not part of a record (timestamps, tags, prose) is
//! skipped. A landmark record needs all five names, in any order.

use crate::detection::{DetectionBox, Landmarks, Point};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token<'a> {
    Word(&'a str),
    Number(&'a str),
    Colon,
    Comma,
    Open,
    Close,
    Other,
}

#[derive(Debug, Clone, Copy)]
struct Spanned<'a> {
    token: Token<'a>,
    at: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Detection { at: usize, bbox: DetectionBox },
    Landmarks { at: usize, landmarks: Landmarks },
}

impl Record {
    pub fn offset(&self) -> usize {
        match self {
            Record::Detection { at, .. } | Record::Landmarks { at, .. } => *at,
        }
    }
}

fn tokenize(text: &str) -> Vec<Spanned<'_>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;
        let token = match c {
            b'[' => Token::Open,
            b']' => Token::Close,
            b':' => Token::Colon,
            b',' => Token::Comma,
            c if c.is_ascii_whitespace() => {
                i += 1;
                continue;
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                tokens.push(Spanned {
                    token: Token::Word(&text[start..i]),
                    at: start,
                });
                continue;
            }
            c if c.is_ascii_digit() || ((c == b'-' || c == b'.') && starts_number(bytes, i)) => {
                i = scan_number(bytes, i);
                tokens.push(Spanned {
                    token: Token::Number(&text[start..i]),
                    at: start,
                });
                continue;
            }
            _ => Token::Other,
        };
        tokens.push(Spanned { token, at: start });
        // Non-ASCII bytes are skipped one at a time; they only ever become
        // `Other`, and every slice above starts and ends on ASCII.
        i += 1;
    }

    tokens
}

fn starts_number(bytes: &[u8], i: usize) -> bool {
    match bytes[i] {
        b'-' => bytes
            .get(i + 1)
            .is_some_and(|&b| b.is_ascii_digit() || b == b'.'),
        b'.' => bytes.get(i + 1).is_some_and(u8::is_ascii_digit),
        _ => false,
    }
}

fn scan_number(bytes: &[u8], mut i: usize) -> usize {
    if bytes[i] == b'-' {
        i += 1;
    }
    let mut seen_dot = false;
    while i < bytes.len() {
        match bytes[i] {
            b'0'..=b'9' => i += 1,
            b'.' if !seen_dot => {
                seen_dot = true;
                i += 1;
            }
            _ => break,
        }
    }
    i
}

struct Cursor<'t, 'a> {
    tokens: &'t [Spanned<'a>],
    pos: usize,
}

impl<'t, 'a> Cursor<'t, 'a> {
    fn new(tokens: &'t [Spanned<'a>]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<Token<'a>> {
        self.tokens.get(self.pos).map(|s| s.token)
    }

    fn next(&mut self) -> Option<Token<'a>> {
        let token = self.peek()?;
        self.pos += 1;
        Some(token)
    }

    fn eat(&mut self, expected: Token<'_>) -> Option<()> {
        (self.next()? == expected).then_some(())
    }

    fn word(&mut self) -> Option<&'a str> {
        match self.next()? {
            Token::Word(w) => Some(w),
            _ => None,
        }
    }

    fn number(&mut self) -> Option<&'a str> {
        match self.next()? {
            Token::Number(n) => Some(n),
            _ => None,
        }
    }

    fn int(&mut self) -> Option<i32> {
        self.number()?.parse().ok()
    }

    /// `name ':' value`
    fn field<T>(&mut self, name: &str, value: impl FnOnce(&mut Self) -> Option<T>) -> Option<T> {
        if self.word()? != name {
            return None;
        }
        self.eat(Token::Colon)?;
        value(self)
    }
}

fn parse_detection(cursor: &mut Cursor<'_, '_>) -> Option<DetectionBox> {
    cursor.eat(Token::Open)?;
    let score: f32 = cursor.field("score", |c| c.number()?.parse().ok())?;
    cursor.eat(Token::Comma)?;
    let x1 = cursor.field("x1", Cursor::int)?;
    cursor.eat(Token::Comma)?;
    let y1 = cursor.field("y1", Cursor::int)?;
    cursor.eat(Token::Comma)?;
    let x2 = cursor.field("x2", Cursor::int)?;
    cursor.eat(Token::Comma)?;
    let y2 = cursor.field("y2", Cursor::int)?;
    cursor.eat(Token::Close)?;

    Some(DetectionBox {
        x1,
        y1,
        x2,
        y2,
        score: Some(score),
    })
}

fn parse_pair(cursor: &mut Cursor<'_, '_>) -> Option<(&'static str, Point)> {
    const NAMES: [&str; 5] = ["left_eye", "right_eye", "nose", "left_mouth", "right_mouth"];

    let word = cursor.word()?;
    let name = NAMES.into_iter().find(|n| *n == word)?;
    cursor.eat(Token::Colon)?;
    cursor.eat(Token::Open)?;
    let x = cursor.int()?;
    cursor.eat(Token::Comma)?;
    let y = cursor.int()?;
    cursor.eat(Token::Close)?;
    Some((name, Point::new(x, y)))
}

fn parse_landmarks(cursor: &mut Cursor<'_, '_>) -> Option<Landmarks> {
    let bracketed = cursor.peek() == Some(Token::Open);
    if bracketed {
        cursor.next();
    }

    let mut slots: [Option<Point>; 5] = [None; 5];
    for i in 0..5 {
        if i > 0 {
            cursor.eat(Token::Comma)?;
        }
        let (name, point) = parse_pair(cursor)?;
        let slot = match name {
            "left_eye" => 0,
            "right_eye" => 1,
            "nose" => 2,
            "left_mouth" => 3,
            _ => 4,
        };
        if slots[slot].replace(point).is_some() {
            return None;
        }
    }

    if bracketed {
        cursor.eat(Token::Close)?;
    }

    Some(Landmarks {
        left_eye: slots[0]?,
        right_eye: slots[1]?,
        nose: slots[2]?,
        left_mouth: slots[3]?,
        right_mouth: slots[4]?,
    })
}

/// Returns every detection and landmark record in `text`, in text order.
pub fn scan(text: &str) -> Vec<Record> {
    let tokens = tokenize(text);
    let mut records = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        let at = tokens[i].at;
        let rest = &tokens[i..];

        let mut cursor = Cursor::new(rest);
        if let Some(bbox) = parse_detection(&mut cursor) {
            records.push(Record::Detection { at, bbox });
            i += cursor.pos;
            continue;
        }

        let mut cursor = Cursor::new(rest);
        if let Some(landmarks) = parse_landmarks(&mut cursor) {
            records.push(Record::Landmarks { at, landmarks });
            i += cursor.pos;
            continue;
        }

        i += 1;
    }

    records
}
