//! Conversion of ANSI-colored formatter output into ratatui text.
//!
//! Only SGR sequences are interpreted; every other escape is dropped so raw
//! tool output can never move the cursor or retitle the terminal.

use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Span;

const ESC: char = '\x1b';
const BEL: char = '\x07';

/// SGR codes that switch a modifier on, and the codes that switch it off.
const MODIFIER_CODES: &[(u16, Modifier)] = &[
    (1, Modifier::BOLD),
    (2, Modifier::DIM),
    (3, Modifier::ITALIC),
    (4, Modifier::UNDERLINED),
    (5, Modifier::SLOW_BLINK),
    (6, Modifier::RAPID_BLINK),
    (7, Modifier::REVERSED),
    (8, Modifier::HIDDEN),
    (9, Modifier::CROSSED_OUT),
];

const RESET_CODES: &[(u16, Modifier)] = &[
    (22, Modifier::BOLD.union(Modifier::DIM)),
    (23, Modifier::ITALIC),
    (24, Modifier::UNDERLINED),
    (25, Modifier::SLOW_BLINK.union(Modifier::RAPID_BLINK)),
    (27, Modifier::REVERSED),
    (28, Modifier::HIDDEN),
    (29, Modifier::CROSSED_OUT),
];

const PALETTE: [Color; 8] = [
    Color::Black,
    Color::Red,
    Color::Green,
    Color::Yellow,
    Color::Blue,
    Color::Magenta,
    Color::Cyan,
    Color::Gray,
];

const BRIGHT_PALETTE: [Color; 8] = [
    Color::DarkGray,
    Color::LightRed,
    Color::LightGreen,
    Color::LightYellow,
    Color::LightBlue,
    Color::LightMagenta,
    Color::LightCyan,
    Color::White,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pen {
    fg: Option<Color>,
    bg: Option<Color>,
    modifiers: Modifier,
}

impl Default for Pen {
    fn default() -> Self {
        Self {
            fg: None,
            bg: None,
            modifiers: Modifier::empty(),
        }
    }
}

impl Pen {
    fn style(&self) -> Style {
        let mut style = Style::default().add_modifier(self.modifiers);
        if let Some(fg) = self.fg {
            style = style.fg(fg);
        }
        if let Some(bg) = self.bg {
            style = style.bg(bg);
        }
        style
    }

    fn apply(&mut self, codes: &[u16]) {
        let mut rest = codes;
        while let Some((&code, tail)) = rest.split_first() {
            rest = tail;
            match code {
                0 => *self = Pen::default(),
                30..=37 => self.fg = Some(PALETTE[usize::from(code - 30)]),
                90..=97 => self.fg = Some(BRIGHT_PALETTE[usize::from(code - 90)]),
                40..=47 => self.bg = Some(PALETTE[usize::from(code - 40)]),
                100..=107 => self.bg = Some(BRIGHT_PALETTE[usize::from(code - 100)]),
                39 => self.fg = None,
                49 => self.bg = None,
                38 | 48 => {
                    if let Some((color, used)) = extended_color(rest) {
                        if code == 38 {
                            self.fg = Some(color);
                        } else {
                            self.bg = Some(color);
                        }
                        rest = &rest[used..];
                    }
                }
                _ => {
                    if let Some((_, m)) = MODIFIER_CODES.iter().find(|(c, _)| *c == code) {
                        self.modifiers.insert(*m);
                    } else if let Some((_, m)) = RESET_CODES.iter().find(|(c, _)| *c == code) {
                        self.modifiers.remove(*m);
                    }
                }
            }
        }
    }
}

/// Parses `5;N` (256-color) or `2;R;G;B` (truecolor) after a 38/48 code and
/// returns the color plus how many codes it consumed.
fn extended_color(codes: &[u16]) -> Option<(Color, usize)> {
    let byte = |i: usize| codes.get(i).and_then(|v| u8::try_from(*v).ok());
    match codes.first()? {
        5 => Some((Color::Indexed(byte(1)?), 2)),
        2 => Some((Color::Rgb(byte(1)?, byte(2)?, byte(3)?), 4)),
        _ => None,
    }
}

/// Splits an SGR parameter string. Empty fields mean 0, like terminals do.
fn sgr_codes(params: &str) -> Vec<u16> {
    if params.is_empty() {
        return vec![0];
    }
    params
        .split(';')
        .filter_map(|field| {
            if field.is_empty() {
                Some(0)
            } else {
                field.parse().ok()
            }
        })
        .collect()
}

/// Styled spans for a single line of text.
///
/// A carriage return discards everything before it, which keeps progress-bar
/// style output readable.
pub fn ansi_spans(text: &str) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    let mut pending = String::new();
    let mut pen = Pen::default();
    let mut chars = text.chars().peekable();

    let flush = |spans: &mut Vec<Span<'static>>, pending: &mut String, pen: &Pen| {
        if !pending.is_empty() {
            spans.push(Span::styled(std::mem::take(pending), pen.style()));
        }
    };

    while let Some(ch) = chars.next() {
        match ch {
            ESC => match chars.peek() {
                Some('[') => {
                    chars.next();
                    let mut params = String::new();
                    let mut terminator = None;
                    for c in chars.by_ref() {
                        if ('@'..='~').contains(&c) {
                            terminator = Some(c);
                            break;
                        }
                        params.push(c);
                    }
                    if terminator == Some('m') {
                        flush(&mut spans, &mut pending, &pen);
                        pen.apply(&sgr_codes(&params));
                    }
                }
                Some(']') => {
                    chars.next();
                    while let Some(c) = chars.next() {
                        if c == BEL {
                            break;
                        }
                        if c == ESC && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            },
            '\r' => {
                pending.clear();
                spans.clear();
            }
            _ => pending.push(ch),
        }
    }
    flush(&mut spans, &mut pending, &pen);
    spans
}
