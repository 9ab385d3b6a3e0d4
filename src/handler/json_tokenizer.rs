use std::ops::Range;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token {
    OpenObject,
    CloseObject,
    OpenArray,
    CloseArray,
    Colon,
    Comma,
    String,
    Number,
    Boolean(bool),
    Null,
}

/// Splits a JSON document into tokens, reporting the byte span of each.
///
/// String spans include both quotes. Escapes are skipped but not decoded,
/// and numbers are only delimited; turning a span into a value is left to
/// the caller.
pub struct JsonTokenizer<'a> {
    input: &'a [u8],
    position: usize,
}

impl<'a> JsonTokenizer<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        JsonTokenizer { input, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn next_token(&mut self) -> Result<Option<(Token, Range<usize>)>, String> {
        while self.position < self.input.len() && self.input[self.position].is_ascii_whitespace() {
            self.position += 1;
        }
        let start = self.position;
        let current_byte = match self.input.get(start) {
            Some(b) => *b,
            None => return Ok(None),
        };

        let token = match current_byte {
            b'{' => self.single(Token::OpenObject),
            b'}' => self.single(Token::CloseObject),
            b'[' => self.single(Token::OpenArray),
            b']' => self.single(Token::CloseArray),
            b':' => self.single(Token::Colon),
            b',' => self.single(Token::Comma),
            b'"' => self.string()?,
            b't' => self.literal(b"true", Token::Boolean(true))?,
            b'f' => self.literal(b"false", Token::Boolean(false))?,
            b'n' => self.literal(b"null", Token::Null)?,
            b'-' | b'0'..=b'9' => self.number(),
            other => {
                return Err(format!(
                    "unexpected character '{}' at position {}",
                    other as char, start
                ))
            }
        };
        Ok(Some((token, start..self.position)))
    }

    fn single(&mut self, token: Token) -> Token {
        self.position += 1;
        token
    }

    fn string(&mut self) -> Result<Token, String> {
        let start = self.position;
        self.position += 1;
        while let Some(b) = self.input.get(self.position) {
            match b {
                b'"' => {
                    self.position += 1;
                    return Ok(Token::String);
                }
                // skip the escaped character
                b'\\' => self.position += 2,
                _ => self.position += 1,
            }
        }
        Err(format!("unterminated string starting at position {}", start))
    }

    fn literal(&mut self, expected: &[u8], token: Token) -> Result<Token, String> {
        if self.input[self.position..].starts_with(expected) {
            self.position += expected.len();
            Ok(token)
        } else {
            Err(format!("invalid literal at position {}", self.position))
        }
    }

    fn number(&mut self) -> Token {
        while let Some(b) = self.input.get(self.position) {
            match b {
                b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E' => self.position += 1,
                _ => break,
            }
        }
        Token::Number
    }
}
