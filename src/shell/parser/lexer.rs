use std::iter::Peekable;
use std::str::CharIndices;

use super::ParseError;

/// 按 POSIX shell 的规则把一行输入切分成单词
pub fn tokenize(line: &str) -> Result<Vec<String>, ParseError> {
    let mut lexer = Lexer::new(line);
    let mut words = Vec::new();
    while let Some(word) = lexer.next_word()? {
        words.push(word);
    }
    Ok(words)
}

/// 单词之间的分隔符。其他 Unicode 空白（如 U+00A0）属于单词内容。
pub(super) fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

pub struct Lexer<'a> {
    source: &'a str,
    input: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            input: source.char_indices().peekable(),
        }
    }

    /// 读取下一个单词，输入结束时返回 `None`
    pub fn next_word(&mut self) -> Result<Option<String>, ParseError> {
        self.skip_whitespace();
        if self.peek_char().is_none() {
            return Ok(None);
        }

        let mut word = String::new();
        while let Some(c) = self.peek_char() {
            match c {
                c if is_blank(c) => break,
                '\'' => self.read_single_quoted(&mut word)?,
                '"' => self.read_double_quoted(&mut word)?,
                '\\' => {
                    self.read_char();
                    // 行尾孤立的反斜杠按字面保留
                    word.push(self.read_char().map(|(_, c)| c).unwrap_or('\\'));
                }
                _ => {
                    self.read_char();
                    word.push(c);
                }
            }
        }

        Ok(Some(word))
    }

    fn read_char(&mut self) -> Option<(usize, char)> {
        self.input.next()
    }

    fn peek_char(&mut self) -> Option<char> {
        self.input.peek().map(|&(_, c)| c)
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek_char() {
            if !is_blank(c) {
                break;
            }
            self.read_char();
        }
    }

    fn read_single_quoted(&mut self, word: &mut String) -> Result<(), ParseError> {
        let start = self.open_quote();
        loop {
            match self.read_char() {
                Some((_, '\'')) => return Ok(()),
                Some((_, c)) => word.push(c),
                None => return Err(self.unterminated(start)),
            }
        }
    }

    fn read_double_quoted(&mut self, word: &mut String) -> Result<(), ParseError> {
        let start = self.open_quote();
        loop {
            match self.read_char() {
                Some((_, '"')) => return Ok(()),
                Some((_, '\\')) => match self.peek_char() {
                    Some(next @ ('\\' | '"' | '$' | '`')) => {
                        self.read_char();
                        word.push(next);
                    }
                    _ => word.push('\\'),
                },
                Some((_, c)) => word.push(c),
                None => return Err(self.unterminated(start)),
            }
        }
    }

    fn open_quote(&mut self) -> usize {
        self.read_char().map(|(pos, _)| pos).unwrap_or(self.source.len())
    }

    fn unterminated(&self, start: usize) -> ParseError {
        ParseError::UnterminatedQuote(self.source[start..].to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(clippy::unwrap_used)]
    fn words(line: &str) -> Vec<String> {
        tokenize(line).unwrap()
    }

    #[test]
    fn test_simple_command() {
        assert_eq!(words("ls -l"), vec!["ls", "-l"]);
    }

    #[test]
    fn test_blank_line() {
        assert!(words("").is_empty());
        assert!(words("   \t  ").is_empty());
    }

    #[test]
    fn test_only_ascii_blanks_separate() {
        assert_eq!(words("echo a\u{a0}b"), vec!["echo", "a\u{a0}b"]);
        assert_eq!(words("\u{2003}x"), vec!["\u{2003}x"]);
        assert_eq!(words("a\r\nb"), vec!["a", "b"]);
    }

    #[test]
    fn test_quoted_strings() {
        assert_eq!(
            words(r#"echo "hello world" 'foo bar'"#),
            vec!["echo", "hello world", "foo bar"]
        );
    }

    #[test]
    fn test_operators_are_plain_words() {
        assert_eq!(
            words("cat < in.txt >> out.txt"),
            vec!["cat", "<", "in.txt", ">>", "out.txt"]
        );
        // 没有空格分隔时不拆分
        assert_eq!(words("echo a>b"), vec!["echo", "a>b"]);
    }

    #[test]
    fn test_adjacent_pieces_join() {
        assert_eq!(words(r#"a"b c"'d'e"#), vec!["ab cde"]);
        assert_eq!(words(r#"echo "" ''"#), vec!["echo", "", ""]);
    }

    #[test]
    fn test_backslash_escapes() {
        assert_eq!(words(r"echo a\ b \'x"), vec!["echo", "a b", "'x"]);
        assert_eq!(words(r#"echo "say \"hi\" \n""#), vec!["echo", r#"say "hi" \n"#]);
        assert_eq!(words(r"echo 'no \escape'"), vec!["echo", r"no \escape"]);
        assert_eq!(words(r"echo trailing\"), vec!["echo", r"trailing\"]);
    }

    #[test]
    fn test_unterminated_quote() {
        assert_eq!(
            tokenize("echo 'abc def"),
            Err(ParseError::UnterminatedQuote("'abc def".to_string()))
        );
        assert_eq!(
            tokenize(r#"grep "x"  "y"#),
            Err(ParseError::UnterminatedQuote(r#""y"#.to_string()))
        );
    }

    #[test]
    fn test_rejoin_matches_unquoted_split() {
        for line in ["ls   -la  /tmp", "  grep -v foo ", "a b\tc"] {
            let rejoined = words(line).join(" ");
            let expected: Vec<&str> = line.split_whitespace().collect();
            assert_eq!(rejoined, expected.join(" "));
        }
        assert_eq!(words(r#"echo "a" 'b'"#).join(" "), "echo a b");
    }
}
