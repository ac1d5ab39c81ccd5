//! User-defined classification rules.
//!
//! A rule file maps short identifiers to bookkeeping account labels and
//! lists regular expressions per identifier:
//!
//! ```json
//! {
//!   "accounts": { "food": "Expenses:Groceries", "fuel": "Expenses:Car:Fuel" },
//!   "ignore": ["^Transfer to own card"],
//!   "rules": [
//!     { "food": ["Lidl", "(?i)silpo"] },
//!     { "fuel": ["WOG", "OKKO"] }
//!   ]
//! }
//! ```
//!
//! Rule groups are tried in file order, then identifiers within a group in
//! file order, so an earlier group wins when patterns overlap. Patterns
//! match anywhere in the text and are case-sensitive unless they say
//! otherwise (e.g. `(?i)`).

use crate::error::{Result, SorterError};
use log::debug;
use regex::Regex;
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// One entry of the `rules` list: identifiers and their patterns, in
/// declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RuleGroup(Vec<(String, Vec<String>)>);

impl RuleGroup {
    pub fn new(entries: Vec<(String, Vec<String>)>) -> Self {
        RuleGroup(entries)
    }

    /// Iterates identifiers and their patterns in declaration order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(id, patterns)| (id.as_str(), patterns.as_slice()))
    }
}

impl<'de> Deserialize<'de> for RuleGroup {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct GroupVisitor;

        impl<'de> Visitor<'de> for GroupVisitor {
            type Value = RuleGroup;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of identifiers to pattern lists")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<RuleGroup, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries: Vec<(String, Vec<String>)> = Vec::new();
                while let Some((id, patterns)) = map.next_entry::<String, Vec<String>>()? {
                    if entries.iter().any(|(seen, _)| *seen == id) {
                        return Err(de::Error::custom(format!(
                            "duplicate identifier {:?} in rule group",
                            id
                        )));
                    }
                    entries.push((id, patterns));
                }
                Ok(RuleGroup(entries))
            }
        }

        deserializer.deserialize_map(GroupVisitor)
    }
}

/// Reads the `accounts` object, rejecting repeated identifiers.
fn unique_accounts<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct AccountsVisitor;

    impl<'de> Visitor<'de> for AccountsVisitor {
        type Value = BTreeMap<String, String>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of identifiers to account labels")
        }

        fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut accounts = BTreeMap::new();
            while let Some((id, label)) = map.next_entry::<String, String>()? {
                if accounts.contains_key(&id) {
                    return Err(de::Error::custom(format!("duplicate account {:?}", id)));
                }
                accounts.insert(id, label);
            }
            Ok(accounts)
        }
    }

    deserializer.deserialize_map(AccountsVisitor)
}

/// Rule file contents before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleDefinition {
    /// Short identifier -> account label
    #[serde(default, deserialize_with = "unique_accounts")]
    pub accounts: BTreeMap<String, String>,

    /// Patterns of records to drop silently
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Ordered rule groups
    #[serde(default)]
    pub rules: Vec<RuleGroup>,
}

impl RuleDefinition {
    /// Checks that accounts and rules are present and that every rule
    /// references a defined account.
    pub fn validate(&self) -> Result<()> {
        if self.accounts.is_empty() {
            return Err(SorterError::Rules("no accounts defined".to_string()));
        }
        if self.rules.is_empty() {
            return Err(SorterError::Rules("no rules defined".to_string()));
        }
        for group in &self.rules {
            for (id, _) in group.entries() {
                if !self.accounts.contains_key(id) {
                    return Err(SorterError::Rules(format!(
                        "rules: undefined account: {:?}",
                        id
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A validated rule set with every pattern compiled.
///
/// Read-only once built.
#[derive(Debug, Clone)]
pub struct RuleSet {
    accounts: BTreeMap<String, String>,
    ignore: Vec<String>,
    rules: Vec<RuleGroup>,
    /// Compiled patterns keyed by their source text
    regexps: HashMap<String, Regex>,
}

impl RuleSet {
    /// Loads, validates and compiles a rule file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(file))
    }

    /// Reads a JSON rule definition from `reader`.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let definition: RuleDefinition = serde_json::from_reader(reader)?;
        Self::new(definition)
    }

    /// Validates and compiles a definition. Nothing is kept on failure.
    pub fn new(definition: RuleDefinition) -> Result<Self> {
        definition.validate()?;

        let mut regexps = HashMap::new();
        for pattern in &definition.ignore {
            compile_into(&mut regexps, pattern, "ignore")?;
        }
        for group in &definition.rules {
            for (id, patterns) in group.entries() {
                for pattern in patterns {
                    compile_into(&mut regexps, pattern, &format!("rule {:?}", id))?;
                }
            }
        }
        debug!(
            "Compiled {} patterns for {} accounts",
            regexps.len(),
            definition.accounts.len()
        );

        Ok(RuleSet {
            accounts: definition.accounts,
            ignore: definition.ignore,
            rules: definition.rules,
            regexps,
        })
    }

    /// Returns `true` if `text` matches any ignore pattern.
    pub fn is_ignored(&self, text: &str) -> bool {
        self.ignore.iter().any(|pattern| self.matches(pattern, text))
    }

    /// Returns the account label of the first identifier, in declaration
    /// order, with a pattern matching `text`.
    pub fn resolve(&self, text: &str) -> Option<&str> {
        for group in &self.rules {
            for (id, patterns) in group.entries() {
                if patterns.iter().any(|pattern| self.matches(pattern, text)) {
                    return self.accounts.get(id).map(String::as_str);
                }
            }
        }
        None
    }

    /// Account labels keyed by short identifier.
    pub fn accounts(&self) -> &BTreeMap<String, String> {
        &self.accounts
    }

    fn matches(&self, pattern: &str, text: &str) -> bool {
        // Every listed pattern was compiled in `new`.
        self.regexps
            .get(pattern)
            .map(|re| re.is_match(text))
            .unwrap_or(false)
    }
}

fn compile_into(regexps: &mut HashMap<String, Regex>, pattern: &str, location: &str) -> Result<()> {
    if regexps.contains_key(pattern) {
        return Ok(());
    }
    let re = Regex::new(pattern).map_err(|source| SorterError::Pattern {
        location: location.to_string(),
        pattern: pattern.to_string(),
        source,
    })?;
    regexps.insert(pattern.to_string(), re);
    Ok(())
}
