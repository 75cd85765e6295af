use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;

pub const DEFAULT_CATEGORY: &str = "unclassified";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    Exact,
    Containment,
    NormalizedVariant,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Normalization {
    StripWhitespace,
    StripParentheses,
    StripHyphens,
    ExpandMark,
}

const NORMALIZATIONS: [Normalization; 4] = [
    Normalization::StripWhitespace,
    Normalization::StripParentheses,
    Normalization::StripHyphens,
    Normalization::ExpandMark,
];

impl Normalization {
    fn apply(self, folded: &str) -> String {
        match self {
            Normalization::StripWhitespace => folded
                .chars()
                .filter(|character| !character.is_whitespace())
                .collect(),
            Normalization::StripParentheses => folded
                .chars()
                .filter(|character| !matches!(character, '(' | ')'))
                .collect(),
            Normalization::StripHyphens => folded
                .chars()
                .filter(|character| *character != '-')
                .collect(),
            Normalization::ExpandMark => expand_mark_abbreviation(folded),
        }
    }
}

#[derive(Debug, Clone)]
struct KnownUnit {
    folded: String,
    variants: [String; 4],
}

impl KnownUnit {
    fn new(raw_name: &str) -> Option<Self> {
        let folded = fold(raw_name);
        if folded.is_empty() {
            return None;
        }

        let variants = NORMALIZATIONS.map(|normalization| normalization.apply(&folded));
        Some(Self { folded, variants })
    }
}

#[derive(Debug, Clone)]
struct Category {
    name: String,
    units: Vec<KnownUnit>,
}

/// Category name to known unit names. Categories keep the order they were
/// added in; that order breaks ties between overlapping names.
#[derive(Debug, Clone, Default)]
pub struct ClassificationDictionary {
    categories: Vec<Category>,
}

impl ClassificationDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_category<I, S>(&mut self, category_name: &str, unit_names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let units = unit_names
            .into_iter()
            .filter_map(|unit_name| KnownUnit::new(unit_name.as_ref()))
            .collect::<Vec<KnownUnit>>();

        if let Some(existing) = self
            .categories
            .iter_mut()
            .find(|category| category.name == category_name)
        {
            existing.units.extend(units);
            return;
        }

        self.categories.push(Category {
            name: category_name.to_string(),
            units,
        });
    }

    pub fn category_names(&self) -> impl Iterator<Item = &str> {
        self.categories.iter().map(|category| category.name.as_str())
    }

    pub fn unit_count(&self) -> usize {
        self.categories
            .iter()
            .map(|category| category.units.len())
            .sum()
    }

    pub fn from_json_str(raw_json: &str) -> Result<Self, String> {
        serde_json::from_str::<Self>(raw_json)
            .map_err(|error| format!("Failed to parse classification dictionary: {error}"))
    }

    /// A missing file is not an error; every unit then resolves to the
    /// default category.
    pub fn load(path: &Path) -> Result<Self, String> {
        let raw_json = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                tracing::warn!(
                    dictionary_path = %path.display(),
                    "Classification dictionary not found; all units will be unclassified"
                );
                return Ok(Self::default());
            }
            Err(error) => {
                return Err(format!(
                    "Failed to read classification dictionary '{}': {error}",
                    path.display()
                ));
            }
        };

        let dictionary = Self::from_json_str(&raw_json)
            .map_err(|error| format!("{error} ('{}')", path.display()))?;
        tracing::info!(
            dictionary_path = %path.display(),
            categories = dictionary.categories.len(),
            units = dictionary.unit_count(),
            "Loaded classification dictionary"
        );
        Ok(dictionary)
    }
}

impl<'de> Deserialize<'de> for ClassificationDictionary {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DictionaryVisitor;

        impl<'de> Visitor<'de> for DictionaryVisitor {
            type Value = ClassificationDictionary;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of category name to a list of unit names")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut dictionary = ClassificationDictionary::default();
                while let Some((category_name, unit_names)) =
                    access.next_entry::<String, Vec<String>>()?
                {
                    dictionary.insert_category(&category_name, unit_names);
                }
                Ok(dictionary)
            }
        }

        deserializer.deserialize_map(DictionaryVisitor)
    }
}

#[derive(Debug, Clone)]
pub struct Classifier {
    dictionary: ClassificationDictionary,
    default_category: String,
}

impl Classifier {
    pub fn new(dictionary: ClassificationDictionary) -> Self {
        Self::with_default_category(dictionary, DEFAULT_CATEGORY)
    }

    pub fn with_default_category(
        dictionary: ClassificationDictionary,
        default_category: &str,
    ) -> Self {
        Self {
            dictionary,
            default_category: default_category.to_string(),
        }
    }

    pub fn classify(&self, unit_name: &str) -> &str {
        self.classify_with_rule(unit_name).0
    }

    pub fn classify_with_rule(&self, unit_name: &str) -> (&str, MatchRule) {
        let query = fold(unit_name);
        if query.is_empty() {
            return (self.default_category.as_str(), MatchRule::Default);
        }

        if let Some(category) = self.first_category_matching(|known| known.folded == query) {
            return (category, MatchRule::Exact);
        }

        if let Some(category) =
            self.first_category_matching(|known| overlaps(&known.folded, &query))
        {
            return (category, MatchRule::Containment);
        }

        let query_variants = NORMALIZATIONS.map(|normalization| normalization.apply(&query));
        if let Some(category) = self.first_category_matching(|known| {
            known
                .variants
                .iter()
                .zip(query_variants.iter())
                .any(|(known_variant, query_variant)| overlaps(known_variant, query_variant))
        }) {
            return (category, MatchRule::NormalizedVariant);
        }

        (self.default_category.as_str(), MatchRule::Default)
    }

    fn first_category_matching<F>(&self, predicate: F) -> Option<&str>
    where
        F: Fn(&KnownUnit) -> bool,
    {
        self.dictionary
            .categories
            .iter()
            .find(|category| category.units.iter().any(&predicate))
            .map(|category| category.name.as_str())
    }
}

fn fold(value: &str) -> String {
    value.trim().to_lowercase()
}

fn overlaps(known: &str, query: &str) -> bool {
    if known.is_empty() || query.is_empty() {
        return false;
    }

    known == query || query.contains(known) || known.contains(query)
}

/// Rewrites a standalone `mk` token to `mark`; `mk.2` becomes `mark 2`.
fn expand_mark_abbreviation(folded: &str) -> String {
    let characters = folded.chars().collect::<Vec<char>>();
    let mut expanded = String::with_capacity(folded.len() + 4);
    let mut index = 0;

    while index < characters.len() {
        let at_word_start = index == 0 || !characters[index - 1].is_alphanumeric();
        let is_abbreviation = at_word_start
            && characters[index] == 'm'
            && characters.get(index + 1) == Some(&'k')
            && !characters
                .get(index + 2)
                .is_some_and(|next| next.is_alphabetic());

        if !is_abbreviation {
            expanded.push(characters[index]);
            index += 1;
            continue;
        }

        expanded.push_str("mark");
        index += 2;
        if characters.get(index) == Some(&'.') {
            index += 1;
            let followed_by_space = characters
                .get(index)
                .is_some_and(|next| next.is_whitespace());
            if index < characters.len() && !followed_by_space {
                expanded.push(' ');
            }
        }
    }

    expanded
}
