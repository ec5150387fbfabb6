//! Value-set filters and text search.
//!
//! A filter context accumulates predicates; each executed predicate yields
//! an indexable set of concept offsets with an O(1) cursor, so expansion
//! never materialises more than the set itself. Text search runs the
//! word/stem index and rates each hit against the ladder in the search
//! documentation below. Both honour the context's cancellation token and
//! its wall-clock budget.

use regex::Regex;

use crate::cancel::{CancelToken, DEFAULT_BUDGET};
use crate::error::{Result, SnomedError};
use crate::expression::ExpressionContext;
use crate::provider::SnomedProvider;
use crate::{SctId, tokenize};

/// How often scan loops probe the cancellation token.
const CANCEL_STRIDE: usize = 4096;

// ─── Filter model ────────────────────────────────────────────────────

/// FHIR value-set filter operators the provider understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Equal,
    IsA,
    DescendentOf,
    IsNotA,
    In,
    Regex,
}

/// One executed filter: concept offsets in ascending order, optional search
/// ratings, and a cursor.
#[derive(Debug, Default)]
pub struct ConceptSet {
    offsets: Vec<u32>,
    ratings: Option<Vec<f64>>,
    at: usize,
}

impl ConceptSet {
    fn new(offsets: Vec<u32>) -> ConceptSet {
        ConceptSet {
            offsets,
            ratings: None,
            at: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    /// Search rating of the i-th entry (rated sets only).
    pub fn rating(&self, i: usize) -> Option<f64> {
        self.ratings.as_ref().and_then(|r| r.get(i)).copied()
    }

    fn contains(&self, offset: u32) -> bool {
        if self.ratings.is_some() {
            // Rated sets are ordered by rating, not offset.
            self.offsets.contains(&offset)
        } else {
            self.offsets.binary_search(&offset).is_ok()
        }
    }
}

/// Accumulated filters for one expansion.
pub struct FilterContext {
    pub(crate) cancel: CancelToken,
    /// True when the caller will iterate results rather than probe them.
    pub iterate: bool,
    pending: Vec<(String, FilterOperator, String)>,
    sets: Vec<ConceptSet>,
}

impl FilterContext {
    pub fn sets(&self) -> &[ConceptSet] {
        &self.sets
    }
}

// ─── Provider filter surface ─────────────────────────────────────────

impl SnomedProvider {
    /// Start a filter context with the default expansion budget.
    pub fn get_prep_context(&self, iterate: bool) -> FilterContext {
        self.get_prep_context_with(iterate, CancelToken::with_budget(DEFAULT_BUDGET))
    }

    pub fn get_prep_context_with(&self, iterate: bool, cancel: CancelToken) -> FilterContext {
        FilterContext {
            cancel,
            iterate,
            pending: Vec::new(),
            sets: Vec::new(),
        }
    }

    /// Can this property/op/value combination be honoured? Used to reject
    /// unsupported compose.include filters before expansion starts.
    pub fn does_filter(&self, prop: &str, op: FilterOperator, value: &str) -> bool {
        match (prop, op) {
            ("concept", FilterOperator::IsA)
            | ("concept", FilterOperator::DescendentOf)
            | ("concept", FilterOperator::IsNotA)
            | ("concept", FilterOperator::In)
            | ("code", FilterOperator::Equal)
            | ("parent", FilterOperator::Equal)
            | ("child", FilterOperator::Equal) => !value.trim().is_empty(),
            ("code", FilterOperator::Regex) => Regex::new(value).is_ok(),
            _ => false,
        }
    }

    /// Queue a filter predicate. Execution happens in
    /// [`Self::execute_filters`].
    pub fn filter(
        &self,
        context: &mut FilterContext,
        prop: &str,
        op: FilterOperator,
        value: &str,
    ) -> Result<()> {
        if !self.does_filter(prop, op, value) {
            return Err(SnomedError::NotSupported(format!(
                "{prop} {op:?} {value}"
            )));
        }
        context
            .pending
            .push((prop.to_string(), op, value.to_string()));
        Ok(())
    }

    /// Execute every queued predicate; returns the number of result sets.
    pub fn execute_filters(&self, context: &mut FilterContext) -> Result<usize> {
        let pending = std::mem::take(&mut context.pending);
        for (prop, op, value) in pending {
            let set = self.execute_one(context, &prop, op, &value)?;
            context.sets.push(ConceptSet::new(set));
        }
        Ok(context.sets.len())
    }

    pub fn filter_size(&self, context: &FilterContext, set: usize) -> usize {
        context.sets[set].len()
    }

    /// Advance the set's cursor; false when exhausted.
    pub fn filter_more(&self, context: &mut FilterContext, set: usize) -> Result<bool> {
        context.cancel.check("filter iteration")?;
        let set = &mut context.sets[set];
        if set.at < set.offsets.len() {
            set.at += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// The concept under the cursor (after a successful
    /// [`Self::filter_more`]).
    pub fn filter_concept(&self, context: &FilterContext, set: usize) -> Option<ExpressionContext> {
        let set = &context.sets[set];
        set.offsets
            .get(set.at.checked_sub(1)?)
            .map(|&offset| ExpressionContext::Reference(offset))
    }

    /// Locate a code inside a filtered set.
    pub fn filter_locate(
        &self,
        context: &FilterContext,
        set: usize,
        code: &str,
    ) -> std::result::Result<ExpressionContext, String> {
        let located = self.locate(code);
        let Some(found) = located.context else {
            return Err(located.message.unwrap_or_else(|| "not found".to_string()));
        };
        match found.reference() {
            Some(offset) if context.sets[set].contains(offset) => Ok(found),
            Some(_) => Err(format!("{code} is not in the filtered set")),
            None => Err(format!(
                "'{code}' is an expression; filters select plain concepts"
            )),
        }
    }

    /// Is this context's concept a member of the set?
    pub fn filter_check(&self, context: &FilterContext, set: usize, found: &ExpressionContext) -> bool {
        found
            .reference()
            .map(|offset| context.sets[set].contains(offset))
            .unwrap_or(false)
    }

    /// Validation hook at the end of an expansion; consumes the context.
    pub fn filter_finish(&self, context: FilterContext) -> Result<()> {
        context.cancel.check("filter finish")?;
        Ok(())
    }

    // ── predicate execution ──────────────────────────────────────────

    fn execute_one(
        &self,
        context: &FilterContext,
        prop: &str,
        op: FilterOperator,
        value: &str,
    ) -> Result<Vec<u32>> {
        let cache = self.cache();
        match (prop, op) {
            ("concept", FilterOperator::IsA) => {
                let offset = self.resolve(value)?;
                let mut set = cache.all_descendants(offset);
                set.push(offset);
                set.sort_unstable();
                Ok(set)
            }
            ("concept", FilterOperator::DescendentOf) => {
                let offset = self.resolve(value)?;
                Ok(cache.all_descendants(offset))
            }
            ("concept", FilterOperator::IsNotA) => {
                let offset = self.resolve(value)?;
                let mut excluded = cache.all_descendants(offset);
                excluded.push(offset);
                excluded.sort_unstable();
                let mut set = Vec::new();
                for i in 0..cache.concepts.count() {
                    if i as usize % CANCEL_STRIDE == 0 {
                        context.cancel.check("is-not-a filter")?;
                    }
                    let candidate = cache.concepts.offset_of_nth(i);
                    if excluded.binary_search(&candidate).is_err() {
                        set.push(candidate);
                    }
                }
                Ok(set)
            }
            ("concept", FilterOperator::In) => {
                let mut set = Vec::new();
                for code in value.split(',') {
                    let offset = self.resolve(code.trim())?;
                    // A refset concept means its membership; anything else
                    // means itself.
                    match cache.refset_by_concept(offset) {
                        Some(row) => {
                            let members = cache.refset_members_by_ref(row);
                            for member in members.iter() {
                                if member.kind == crate::store::MemberKind::Concept {
                                    set.push(member.component);
                                }
                            }
                        }
                        None => set.push(offset),
                    }
                }
                set.sort_unstable();
                set.dedup();
                Ok(set)
            }
            ("code", FilterOperator::Equal) => Ok(vec![self.resolve(value)?]),
            ("code", FilterOperator::Regex) => {
                let re = Regex::new(value).map_err(|e| SnomedError::InvalidRegex {
                    pattern: value.to_string(),
                    source: e,
                })?;
                let mut set = Vec::new();
                for i in 0..cache.concepts.count() {
                    if i as usize % CANCEL_STRIDE == 0 {
                        context.cancel.check("code regex filter")?;
                    }
                    let offset = cache.concepts.offset_of_nth(i);
                    if re.is_match(&cache.concepts.id(offset).to_string()) {
                        set.push(offset);
                    }
                }
                Ok(set)
            }
            ("parent", FilterOperator::Equal) => {
                Ok(cache.children(self.resolve(value)?))
            }
            ("child", FilterOperator::Equal) => {
                let mut parents = cache.parents(self.resolve(value)?);
                parents.sort_unstable();
                Ok(parents)
            }
            _ => Err(SnomedError::NotSupported(format!("{prop} {op:?} {value}"))),
        }
    }

    fn resolve(&self, code: &str) -> Result<u32> {
        code.trim()
            .parse::<SctId>()
            .ok()
            .and_then(|id| self.cache().concepts.find(id))
            .ok_or_else(|| SnomedError::NotFound {
                code: code.to_string(),
            })
    }

    // ── text search ──────────────────────────────────────────────────

    /// Search the word/stem index. With `sort`, results order by rating
    /// descending (ties ascending by offset); otherwise by offset. The set
    /// is appended to the context; its index is returned.
    pub fn search_filter(
        &self,
        context: &mut FilterContext,
        text: &str,
        sort: bool,
    ) -> Result<usize> {
        let candidates = self.search_candidates(context, text)?;
        let mut rated: Vec<(u32, f64)> = Vec::with_capacity(candidates.len());
        for (i, offset) in candidates.into_iter().enumerate() {
            if i % CANCEL_STRIDE == 0 {
                context.cancel.check("search rating")?;
            }
            rated.push((offset, self.rate(offset, text)));
        }
        if sort {
            rated.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.0.cmp(&b.0))
            });
        }
        let mut set = ConceptSet::new(rated.iter().map(|&(offset, _)| offset).collect());
        set.ratings = Some(rated.into_iter().map(|(_, rating)| rating).collect());
        context.sets.push(set);
        Ok(context.sets.len() - 1)
    }

    /// Candidate concepts for a query: the stem index for words, the
    /// identity index for digit queries.
    fn search_candidates(&self, context: &FilterContext, text: &str) -> Result<Vec<u32>> {
        let cache = self.cache();
        let query = text.trim();

        if query.bytes().all(|b| b.is_ascii_digit()) && !query.is_empty() {
            // Code search: exact hit plus prefix scan.
            let mut set = Vec::new();
            for i in 0..cache.concepts.count() {
                if i as usize % CANCEL_STRIDE == 0 {
                    context.cancel.check("code search")?;
                }
                let offset = cache.concepts.offset_of_nth(i);
                if cache.concepts.id(offset).to_string().starts_with(query) {
                    set.push(offset);
                }
            }
            return Ok(set);
        }

        let stemmer = cache.default_language.stemmer();
        let mut intersection: Option<Vec<u32>> = None;
        for token in tokenize(query) {
            context.cancel.check("text search")?;
            let stem = stemmer.stem(&token).into_owned();
            let mut token_set: Vec<u32> = Vec::new();
            for stem_id in cache.stems.find_prefix(&stem, &cache.strings) {
                token_set.extend(cache.refs.read(cache.stems.concepts(stem_id)).iter());
            }
            token_set.sort_unstable();
            token_set.dedup();
            intersection = Some(match intersection {
                None => token_set,
                Some(current) => intersect_sorted(&current, &token_set),
            });
        }
        Ok(intersection.unwrap_or_default())
    }

    /// The rating ladder: exact code or display 100, code prefix 90,
    /// display prefix 80..90 scaled by length ratio, display substring 60,
    /// FSN substring 50, other designation substring 40, text definition
    /// substring 30, stem-only hit 10.
    fn rate(&self, offset: u32, query: &str) -> f64 {
        let cache = self.cache();
        let query_lc = query.trim().to_lowercase();
        let code = cache.concepts.id(offset).to_string();
        if code == query_lc {
            return 100.0;
        }
        let display = self.display(&ExpressionContext::Reference(offset), &[]).to_lowercase();
        if display == query_lc {
            return 100.0;
        }
        if code.starts_with(&query_lc) {
            return 90.0;
        }
        if !display.is_empty() && display.starts_with(&query_lc) {
            return 80.0 + 10.0 * (query_lc.len() as f64 / display.len() as f64);
        }
        if display.contains(&query_lc) {
            return 60.0;
        }

        let fsn_kind = cache.concepts.find(crate::FSN_TYPE);
        let definition_kind = cache.concepts.find(crate::TEXT_DEFINITION_TYPE);
        let mut best = 10.0f64;
        for desc in cache.refs.read(cache.concepts.descriptions(offset)).iter() {
            let term = cache.strings.get(cache.descriptions.term(desc)).to_lowercase();
            if !term.contains(&query_lc) {
                continue;
            }
            let kind = Some(cache.descriptions.kind(desc));
            let score = if kind == fsn_kind {
                50.0
            } else if kind == definition_kind {
                30.0
            } else {
                40.0
            };
            best = best.max(score);
        }
        best
    }
}

/// Intersection of two ascending slices.
fn intersect_sorted(a: &[u32], b: &[u32]) -> Vec<u32> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
        }
    }
    out
}

/// Convenience display of operators in UIs and logs.
impl std::fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            FilterOperator::Equal => "=",
            FilterOperator::IsA => "is-a",
            FilterOperator::DescendentOf => "descendent-of",
            FilterOperator::IsNotA => "is-not-a",
            FilterOperator::In => "in",
            FilterOperator::Regex => "regex",
        };
        write!(f, "{text}")
    }
}

#[cfg(test)]
#[path = "filter_tests.rs"]
mod tests;
