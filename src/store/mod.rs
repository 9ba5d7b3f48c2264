//! Result store: an explicit context for routing results during a solve.
//!
//! Results are keyed by scope path, owning template (none for globals) and
//! result name, kept as separate fields so a `.` inside a template name can
//! never be mistaken for a separator. Scopes nest through `ResultStore::scope`,
//! which returns a guard that pops the segment again when dropped.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::ops::{Deref, DerefMut};

use tracing::debug;

use crate::operator::OperatorResult;

/// Where a result lives in the store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResultKey {
    pub scope: Vec<String>,
    pub template: Option<String>,
    pub name: String,
}

impl ResultKey {
    pub fn new(scope: &[&str], template: Option<&str>, name: &str) -> Self {
        Self {
            scope: scope.iter().map(|s| s.to_string()).collect(),
            template: template.map(str::to_string),
            name: name.to_string(),
        }
    }
}

/// Dotted form, for logs and summaries only.
impl fmt::Display for ResultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.scope {
            write!(f, "{segment}.")?;
        }
        if let Some(template) = &self.template {
            write!(f, "{template}.")?;
        }
        f.write_str(&self.name)
    }
}

#[derive(Debug, Default)]
pub struct ResultStore {
    scopes: Vec<String>,
    per_template: BTreeMap<ResultKey, OperatorResult>,
    global: BTreeMap<ResultKey, OperatorResult>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter `name` until the returned guard is dropped.
    pub fn scope(&mut self, name: &str) -> ScopeGuard<'_> {
        self.scopes.push(name.to_string());
        ScopeGuard { store: self }
    }

    /// Current scope path, segments joined by `.`.
    pub fn current_scope(&self) -> String {
        self.scopes.join(".")
    }

    fn key(&self, template: Option<&str>, name: &str) -> ResultKey {
        ResultKey {
            scope: self.scopes.clone(),
            template: template.map(str::to_string),
            name: name.to_string(),
        }
    }

    /// Store `result` under the current scope for `template`. Replaces any previous value.
    pub fn store_per_template(&mut self, template: &str, name: &str, result: OperatorResult) {
        let key = self.key(Some(template), name);
        debug!(%key, kind = result.kind_name(), "store result");
        self.per_template.insert(key, result);
    }

    pub fn per_template(&self, template: &str, name: &str) -> Option<&OperatorResult> {
        self.per_template.get(&self.key(Some(template), name))
    }

    pub fn store_global(&mut self, name: &str, result: OperatorResult) {
        let key = self.key(None, name);
        debug!(%key, kind = result.kind_name(), "store global result");
        self.global.insert(key, result);
    }

    pub fn global(&self, name: &str) -> Option<&OperatorResult> {
        self.global.get(&self.key(None, name))
    }

    /// Lookup by full key, independent of the current scope.
    pub fn get(&self, key: &ResultKey) -> Option<&OperatorResult> {
        match key.template {
            Some(_) => self.per_template.get(key),
            None => self.global.get(key),
        }
    }

    /// Templates with a result called `name` under the current scope.
    pub fn templates_with(&self, name: &str) -> Vec<String> {
        self.per_template
            .keys()
            .filter(|k| k.scope == self.scopes && k.name == name)
            .filter_map(|k| k.template.clone())
            .collect()
    }

    /// All stored results with their keys, per-template first.
    pub fn iter(&self) -> impl Iterator<Item = (&ResultKey, &OperatorResult)> {
        self.per_template.iter().chain(self.global.iter())
    }

    pub fn len(&self) -> usize {
        self.per_template.len() + self.global.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One `<key>\t<Kind>\t<samples>` line per stored result.
    pub fn save_summary<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        for (key, result) in self.iter() {
            write!(out, "{key}\t")?;
            result.save_line(out)?;
        }
        Ok(())
    }
}

/// Keeps a scope segment pushed for its lifetime.
pub struct ScopeGuard<'a> {
    store: &'a mut ResultStore,
}

impl Deref for ScopeGuard<'_> {
    type Target = ResultStore;

    fn deref(&self) -> &ResultStore {
        self.store
    }
}

impl DerefMut for ScopeGuard<'_> {
    fn deref_mut(&mut self) -> &mut ResultStore {
        self.store
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.store.scopes.pop();
    }
}
