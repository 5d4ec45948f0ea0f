use super::model::Link;

/// `allLinks` filter. Each level contributes one clause built from its own `*_contains` fields
/// (all of which must hold), followed by the clauses of every `or` branch; a link matches when
/// any clause does. A filter with no clauses at all matches every link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkFilter {
    pub or: Vec<LinkFilter>,
    pub description_contains: Option<String>,
    pub url_contains: Option<String>,
}

/// One conjunctive term of a flattened [`LinkFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clause<'a> {
    pub description_contains: Option<&'a str>,
    pub url_contains: Option<&'a str>,
}

impl Clause<'_> {
    pub fn matches(&self, link: &Link) -> bool {
        self.description_contains.map_or(true, |s| link.description.contains(s))
            && self.url_contains.map_or(true, |s| link.url.contains(s))
    }
}

fn non_empty(text: &Option<String>) -> Option<&str> {
    text.as_deref().filter(|s| !s.is_empty())
}

impl LinkFilter {
    pub fn description_contains(text: impl Into<String>) -> Self {
        Self { description_contains: Some(text.into()), ..Default::default() }
    }

    pub fn url_contains(text: impl Into<String>) -> Self {
        Self { url_contains: Some(text.into()), ..Default::default() }
    }

    pub fn or(mut self, other: LinkFilter) -> Self {
        self.or.push(other);
        self
    }

    /// Flattens the filter tree, depth first. Empty search strings are ignored.
    pub fn clauses(&self) -> Vec<Clause<'_>> {
        let clause = Clause {
            description_contains: non_empty(&self.description_contains),
            url_contains: non_empty(&self.url_contains),
        };

        let mut clauses = Vec::new();
        if clause.description_contains.is_some() || clause.url_contains.is_some() {
            clauses.push(clause);
        }
        for branch in &self.or {
            clauses.extend(branch.clauses());
        }
        clauses
    }

    pub fn matches(&self, link: &Link) -> bool {
        let clauses = self.clauses();
        clauses.is_empty() || clauses.iter().any(|c| c.matches(link))
    }
}
