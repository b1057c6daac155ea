//! Word lookup in the text of an open document.

fn is_letter(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// The identifier under the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub name: String,
    /// Character offset of the first letter.
    pub start: usize,
    /// Whether the next non-blank character is `(`.
    pub is_function: bool,
}

impl Word {
    pub fn end(&self) -> usize {
        self.start + self.name.chars().count()
    }
}

/// Line `line` of `text`, without its line terminator.
pub fn line_at(text: &str, line: u32) -> Option<&str> {
    text.split('\n')
        .nth(line as usize)
        .map(|line| line.trim_end_matches('\r'))
}

/// Finds the identifier at `character`, or the one ending right before it.
pub fn word_at(line: &str, character: usize) -> Option<Word> {
    let chars: Vec<char> = line.chars().collect();

    let position = if chars.get(character).copied().is_some_and(is_letter) {
        character
    } else {
        character
            .checked_sub(1)
            .filter(|&p| chars.get(p).copied().is_some_and(is_letter))?
    };

    let start = chars[..position]
        .iter()
        .rposition(|&c| !is_word_char(c))
        .map_or(0, |p| p + 1);
    let end = chars[position..]
        .iter()
        .position(|&c| !is_word_char(c))
        .map_or(chars.len(), |p| position + p);

    let is_function = chars[end..]
        .iter()
        .find(|&&c| c != ' ' && c != '\t')
        .is_some_and(|&c| c == '(');

    Some(Word {
        name: chars[start..end].iter().collect(),
        start,
        is_function,
    })
}

/// The identifier a definition line starts with, e.g. `add` for `add(a, b) {`.
pub fn definition_name(line: &str) -> &str {
    let line = line.trim();
    let end = line.find(|c: char| !is_word_char(c)).unwrap_or(line.len());
    &line[..end]
}

/// The call the cursor is inside of: the function name before the innermost
/// unclosed `(` and the number of top-level commas after it.
pub fn enclosing_call(line: &str, character: usize) -> Option<(String, usize)> {
    let chars: Vec<char> = line.chars().take(character).collect();
    let mut depth = 0usize;
    let mut commas = 0usize;
    let mut open = None;

    for (index, &c) in chars.iter().enumerate().rev() {
        match c {
            ')' => depth += 1,
            '(' if depth == 0 => {
                open = Some(index);
                break;
            }
            '(' => depth -= 1,
            ',' if depth == 0 => commas += 1,
            _ => {}
        }
    }

    let head = chars[..open?]
        .iter()
        .rev()
        .skip_while(|c| c.is_whitespace())
        .take_while(|&&c| is_word_char(c))
        .collect::<Vec<_>>();
    let name: String = head.iter().rev().copied().collect();

    (!name.is_empty()).then_some((name, commas))
}
