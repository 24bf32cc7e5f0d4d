use crate::Filter;
use oxrdf::Variable;
use std::fmt::{Display, Formatter};

/// The solution modifiers attached to a query fragment or plan node.
///
/// Modifiers are applied in a fixed order: filters, projection, distinct, limit. An endpoint may
/// evaluate a prefix of this sequence remotely; the executor applies the rest locally.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    filters: Vec<Filter>,
    optional: bool,
    distinct: bool,
    limit: Option<usize>,
    projection: Option<Vec<Variable>>,
}

impl Modifiers {
    /// Creates an empty set of modifiers.
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        if !self.filters.contains(&filter) {
            self.filters.push(filter);
        }
        self
    }

    #[must_use]
    pub fn with_filters(self, filters: impl IntoIterator<Item = Filter>) -> Self {
        filters.into_iter().fold(self, Self::with_filter)
    }

    /// Replaces all filters.
    #[must_use]
    pub fn with_replaced_filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters = Vec::new();
        self.with_filters(filters)
    }

    #[must_use]
    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    #[must_use]
    pub fn with_distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn with_projection(mut self, projection: Option<Vec<Variable>>) -> Self {
        self.projection = projection;
        self
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn projection(&self) -> Option<&[Variable]> {
        self.projection.as_deref()
    }

    /// Returns true if any modifier changes the produced solutions (i.e., everything except the
    /// optional flag).
    pub fn has_solution_modifiers(&self) -> bool {
        !self.filters.is_empty()
            || self.distinct
            || self.limit.is_some()
            || self.projection.is_some()
    }

    /// Returns the modifiers that change the produced solutions, dropping the optional flag.
    #[must_use]
    pub fn solution_modifiers(&self) -> Self {
        self.clone().with_optional(false)
    }
}

impl Display for Modifiers {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if !self.filters.is_empty() {
            let filters = self
                .filters
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>();
            parts.push(format!("filter: {}", filters.join(", ")));
        }
        if let Some(projection) = &self.projection {
            let projection = projection
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>();
            parts.push(format!("project: {}", projection.join(" ")));
        }
        if self.distinct {
            parts.push("distinct".to_owned());
        }
        if let Some(limit) = self.limit {
            parts.push(format!("limit: {limit}"));
        }
        if self.optional {
            parts.push("optional".to_owned());
        }

        if parts.is_empty() {
            return Ok(());
        }
        write!(f, "[{}]", parts.join("; "))
    }
}
