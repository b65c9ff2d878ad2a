//! Clear action: rewrite with a field subset
//!
//! Emits a single-revision document containing only the fields the
//! selector keeps. Excluded fields vanish along with their widgets, their
//! page `/Annots` entries and their `/AcroForm/Fields` members; orphan
//! widget references are pruned with them.

use crate::document::Document;
use crate::error::Result;
use crate::scan;
use crate::writer::rewrite;
use regex::Regex;
use std::collections::HashSet;

/// Which fields survive a [`Document::clear`].
pub enum FieldSelector {
    /// Keep exactly these names.
    Keep(Vec<String>),
    /// Remove exactly these names.
    Remove(Vec<String>),
    /// Remove every name the pattern matches.
    Pattern(Regex),
    /// Keep every name the callback approves.
    Predicate(Box<dyn Fn(&str) -> bool>),
}

impl FieldSelector {
    pub fn keep<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldSelector::Keep(names.into_iter().map(Into::into).collect())
    }

    pub fn remove<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldSelector::Remove(names.into_iter().map(Into::into).collect())
    }

    pub fn pattern(regex: Regex) -> Self {
        FieldSelector::Pattern(regex)
    }

    pub fn predicate(keep: impl Fn(&str) -> bool + 'static) -> Self {
        FieldSelector::Predicate(Box::new(keep))
    }

    pub(crate) fn removes(&self, name: &str) -> bool {
        match self {
            FieldSelector::Keep(names) => !names.iter().any(|n| n == name),
            FieldSelector::Remove(names) => names.iter().any(|n| n == name),
            FieldSelector::Pattern(regex) => regex.is_match(name),
            FieldSelector::Predicate(keep) => !keep(name),
        }
    }
}

pub(crate) fn clear_document(doc: &mut Document, selector: &FieldSelector) -> Result<Vec<u8>> {
    // Pending revisions first, so the rewrite sees final state.
    doc.write()?;

    let fields = doc.list_fields();
    let mut removed_ids: HashSet<u32> = HashSet::new();
    let mut removed_names: HashSet<String> = HashSet::new();
    for field in &fields {
        if selector.removes(field.name()) {
            removed_ids.insert(field.object_number());
            removed_names.insert(field.name().to_string());
        }
    }

    // Widgets follow their field: by /Parent, or by shared /T.
    let mut exclude = removed_ids.clone();
    doc.each_current_object(|id, body| {
        if !scan::is_widget(body) {
            return;
        }
        let by_parent = scan::ref_value(body, "Parent")
            .map(|parent| removed_ids.contains(&parent.number))
            .unwrap_or(false);
        let by_name = scan::string_value(body, "T")
            .map(|n| removed_names.contains(&n))
            .unwrap_or(false);
        if by_parent || by_name {
            exclude.insert(id.number);
        }
    });

    let plan = doc.build_rewrite_plan(&exclude)?;
    Ok(rewrite::write_document(&plan))
}
