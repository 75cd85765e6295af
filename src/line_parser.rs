pub const DEFAULT_DESTROYED_MARKER: &str = "destroyed";
pub const DEFAULT_TRIGGER_PHRASE: &str = "has achieved";

const TAG_BRACKETS: &[char] = &['[', ']', '【', '】', '〔', '〕', '「', '」'];
const BOX_DRAWING: std::ops::RangeInclusive<char> = '\u{2500}'..='\u{257F}';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSighting {
    pub group: String,
    pub actor: String,
    pub unit: String,
    pub is_destroyed: bool,
}

#[derive(Debug, Clone)]
pub struct LineGrammar {
    destroyed_marker: String,
    trigger_phrase: String,
}

impl Default for LineGrammar {
    fn default() -> Self {
        Self::new(DEFAULT_DESTROYED_MARKER, DEFAULT_TRIGGER_PHRASE)
    }
}

impl LineGrammar {
    pub fn new(destroyed_marker: &str, trigger_phrase: &str) -> Self {
        Self {
            destroyed_marker: destroyed_marker.trim().to_lowercase(),
            trigger_phrase: trigger_phrase.trim().to_lowercase(),
        }
    }

    pub fn contains_trigger(&self, line: &str) -> bool {
        contains_phrase(line, &self.trigger_phrase)
    }

    /// Extracts `TAG actor (unit)` from a line. The tag must open the line,
    /// after an optional `HH:MM[:SS]` stamp. Lines that carry the epoch
    /// trigger phrase never produce a unit event.
    pub fn parse_line(&self, line: &str) -> Option<UnitSighting> {
        if line.trim().is_empty() || self.contains_trigger(line) {
            return None;
        }

        let body = strip_clock_prefix(line.trim_start());
        let opening = body.chars().next().filter(|character| is_tag_delimiter(*character))?;
        let (group, actor, unit) = match_fields_at(body, opening.len_utf8())?;

        Some(UnitSighting {
            group: group.to_string(),
            actor: actor.to_string(),
            unit: unit.to_string(),
            is_destroyed: contains_phrase(line, &self.destroyed_marker),
        })
    }
}

fn is_tag_delimiter(character: char) -> bool {
    TAG_BRACKETS.contains(&character) || BOX_DRAWING.contains(&character)
}

fn strip_clock_prefix(line: &str) -> &str {
    let Some((stamp, rest)) = line.split_once(char::is_whitespace) else {
        return line;
    };

    let fields = stamp.split(':').collect::<Vec<&str>>();
    let is_clock = (2..=3).contains(&fields.len())
        && fields.iter().all(|field| {
            (1..=2).contains(&field.len()) && field.chars().all(|digit| digit.is_ascii_digit())
        });

    if is_clock {
        rest.trim_start()
    } else {
        line
    }
}

fn contains_phrase(line: &str, folded_phrase: &str) -> bool {
    !folded_phrase.is_empty() && line.to_lowercase().contains(folded_phrase)
}

fn match_fields_at(line: &str, tag_start: usize) -> Option<(&str, &str, &str)> {
    let rest = &line[tag_start..];
    let tag_end = rest.find(is_tag_delimiter)?;
    let group = rest[..tag_end].trim();
    if group.is_empty() {
        return None;
    }

    let closing_delimiter_width = rest[tag_end..].chars().next()?.len_utf8();
    let after_tag = &rest[tag_end + closing_delimiter_width..];
    if !after_tag.starts_with(char::is_whitespace) {
        return None;
    }

    let after_whitespace = after_tag.trim_start();
    let open_paren = after_whitespace.find('(')?;
    let actor = after_whitespace[..open_paren].trim();
    if actor.is_empty() {
        return None;
    }

    let unit = balanced_parenthesized(&after_whitespace[open_paren..])?.trim();
    if unit.is_empty() {
        return None;
    }

    Some((group, actor, unit))
}

fn balanced_parenthesized(text: &str) -> Option<&str> {
    let mut depth = 0_usize;
    for (index, character) in text.char_indices() {
        match character {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[1..index]);
                }
            }
            _ => {}
        }
    }

    None
}
