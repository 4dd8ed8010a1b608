//! Role hierarchy resolution
//!
//! A hierarchy rule grants a set of child roles to every principal holding the
//! granting role. The children are either listed explicitly or selected by a
//! regular expression over all known role names. Patterns are evaluated once,
//! when the hierarchy is built, and the matching names are snapshotted:
//!
//! ```
//! use rolevote_authz::{HierarchyResolver, HierarchyRuleSource};
//! use std::collections::BTreeSet;
//!
//! let known: BTreeSet<String> = ["EAB_A", "EAB_B", "OTHER"].iter().map(|s| s.to_string()).collect();
//! let rules = vec![HierarchyRuleSource::pattern("ROLE_ADMIN", "^EAB_")];
//!
//! let resolver = HierarchyResolver::new();
//! resolver.build(&rules, &known)?;
//!
//! let reachable = resolver.reachable(["ROLE_ADMIN"])?;
//! assert!(reachable.contains("EAB_A"));
//! assert!(reachable.contains("EAB_B"));
//! assert!(!reachable.contains("OTHER"));
//! # Ok::<(), rolevote_authz::AuthzError>(())
//! ```
//!
//! `reachable` is memoized on the sorted, deduplicated input set, so set-equal
//! inputs share one cached result.

use crate::error::{AuthzError, Result};
use crate::registry::RoleRegistry;
use crate::store::RoleSource;
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reachable role set shared between callers
pub type ReachableRoles = Arc<BTreeSet<String>>;

/// Flags accepted after a delimited pattern (`/pattern/flags`)
const PATTERN_FLAGS: &str = "imsxu";

/// Hierarchy rule as supplied by configuration
///
/// `expansion` is a JSON array of role names or a pattern string. Anything
/// else is rejected at build time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyRuleSource {
    pub granting_role: String,
    pub expansion: serde_json::Value,
}

impl HierarchyRuleSource {
    /// Rule granting an explicit list of roles
    pub fn list<I, S>(granting_role: impl Into<String>, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let children = children
            .into_iter()
            .map(|child| serde_json::Value::String(child.into()))
            .collect();

        Self {
            granting_role: granting_role.into(),
            expansion: serde_json::Value::Array(children),
        }
    }

    /// Rule granting every known role matching `pattern`
    pub fn pattern(granting_role: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            granting_role: granting_role.into(),
            expansion: serde_json::Value::String(pattern.into()),
        }
    }
}

/// Parsed rule expansion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expansion {
    /// Children listed by name
    ExplicitList(BTreeSet<String>),
    /// Children selected by a regular expression over known role names
    WildcardPattern(String),
}

/// Parsed hierarchy rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyRule {
    pub granting_role: String,
    pub expansion: Expansion,
}

impl HierarchyRule {
    /// Classify a rule source as list or pattern
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::InvalidHierarchyRule` if the granting role is
    /// empty, the expansion is neither an array of strings nor a non-empty
    /// string.
    pub fn parse(source: &HierarchyRuleSource) -> Result<Self> {
        let invalid = |reason: &str| AuthzError::InvalidHierarchyRule {
            role: source.granting_role.clone(),
            reason: reason.to_string(),
        };

        if source.granting_role.is_empty() {
            return Err(invalid("granting role cannot be empty"));
        }

        let expansion = match &source.expansion {
            serde_json::Value::Array(items) => {
                let mut children = BTreeSet::new();
                for item in items {
                    match item {
                        serde_json::Value::String(child) => {
                            children.insert(child.clone());
                        }
                        other => {
                            return Err(invalid(&format!(
                                "list entries must be role names, found {}",
                                other
                            )))
                        }
                    }
                }
                Expansion::ExplicitList(children)
            }
            serde_json::Value::String(pattern) if !pattern.is_empty() => {
                Expansion::WildcardPattern(pattern.clone())
            }
            serde_json::Value::String(_) => return Err(invalid("pattern cannot be empty")),
            other => {
                return Err(invalid(&format!(
                    "expansion must be a list of role names or a pattern, found {}",
                    other
                )))
            }
        };

        Ok(Self {
            granting_role: source.granting_role.clone(),
            expansion,
        })
    }
}

/// Compile a pattern, accepting `/body/flags` delimiters
pub(crate) fn compile_pattern(role: &str, pattern: &str) -> Result<Regex> {
    let (body, flags) = split_delimited(pattern).unwrap_or((pattern, ""));

    let mut builder = RegexBuilder::new(body);
    for flag in flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            _ => builder.unicode(true),
        };
    }

    builder.build().map_err(|e| AuthzError::InvalidHierarchyRule {
        role: role.to_string(),
        reason: format!("invalid pattern '{}': {}", pattern, e),
    })
}

/// Split `/body/flags`; `None` when the pattern is not delimited
fn split_delimited(pattern: &str) -> Option<(&str, &str)> {
    let rest = pattern.strip_prefix('/')?;
    let end = rest.rfind('/')?;
    let (body, flags) = (&rest[..end], &rest[end + 1..]);

    if flags.chars().all(|c| PATTERN_FLAGS.contains(c)) {
        Some((body, flags))
    } else {
        None
    }
}

/// Bound on the reachability memo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoPolicy {
    /// Keep every entry for the lifetime of the build
    #[default]
    Unbounded,
    /// Keep the most recently used entries
    Bounded(NonZeroUsize),
}

impl MemoPolicy {
    /// Policy from an optional capacity; zero is rejected
    pub fn from_capacity(capacity: Option<usize>) -> Result<Self> {
        match capacity {
            None => Ok(Self::Unbounded),
            Some(n) => NonZeroUsize::new(n)
                .map(Self::Bounded)
                .ok_or_else(|| AuthzError::Config("memo capacity must be greater than zero".to_string())),
        }
    }

    fn capacity(&self) -> Option<usize> {
        match self {
            Self::Unbounded => None,
            Self::Bounded(n) => Some(n.get()),
        }
    }
}

/// Memo key: BLAKE3 over the sorted, deduplicated role names
type MemoKey = [u8; 32];

fn memo_key(roles: &BTreeSet<String>) -> MemoKey {
    let mut hasher = blake3::Hasher::new();
    for role in roles {
        hasher.update(&(role.len() as u64).to_le_bytes());
        hasher.update(role.as_bytes());
    }
    *hasher.finalize().as_bytes()
}

enum ReachabilityMemo {
    Unbounded(DashMap<MemoKey, ReachableRoles>),
    Bounded(Mutex<LruCache<MemoKey, ReachableRoles>>),
}

impl ReachabilityMemo {
    fn new(policy: MemoPolicy) -> Self {
        match policy {
            MemoPolicy::Unbounded => Self::Unbounded(DashMap::new()),
            MemoPolicy::Bounded(capacity) => Self::Bounded(Mutex::new(LruCache::new(capacity))),
        }
    }

    fn get(&self, key: &MemoKey) -> Option<ReachableRoles> {
        match self {
            Self::Unbounded(map) => map.get(key).map(|entry| Arc::clone(entry.value())),
            Self::Bounded(cache) => cache.lock().get(key).cloned(),
        }
    }

    /// Store `value` unless another caller got there first; returns the stored entry
    fn insert(&self, key: MemoKey, value: ReachableRoles) -> ReachableRoles {
        match self {
            Self::Unbounded(map) => Arc::clone(map.entry(key).or_insert(value).value()),
            Self::Bounded(cache) => {
                let mut cache = cache.lock();
                if let Some(existing) = cache.get(&key) {
                    return Arc::clone(existing);
                }
                cache.put(key, Arc::clone(&value));
                value
            }
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Unbounded(map) => map.len(),
            Self::Bounded(cache) => cache.lock().len(),
        }
    }
}

/// Immutable result of a build plus its memo and memo counters
struct CompiledHierarchy {
    /// Granting role -> compiled children
    edges: HashMap<String, BTreeSet<String>>,
    memo: ReachabilityMemo,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CompiledHierarchy {
    fn compile(
        sources: &[HierarchyRuleSource],
        known_roles: &BTreeSet<String>,
        policy: MemoPolicy,
    ) -> Result<Self> {
        let mut edges: HashMap<String, BTreeSet<String>> = HashMap::new();

        for source in sources {
            let rule = HierarchyRule::parse(source).map_err(|e| {
                warn!(role = %source.granting_role, error = %e, "Rejected hierarchy rule");
                e
            })?;

            let children = match rule.expansion {
                Expansion::ExplicitList(children) => children,
                Expansion::WildcardPattern(pattern) => {
                    let regex = compile_pattern(&rule.granting_role, &pattern).map_err(|e| {
                        warn!(role = %rule.granting_role, error = %e, "Rejected hierarchy rule");
                        e
                    })?;
                    let matched: BTreeSet<String> = known_roles
                        .iter()
                        .filter(|name| regex.is_match(name))
                        .cloned()
                        .collect();
                    debug!(
                        role = %rule.granting_role,
                        pattern = %pattern,
                        matched = matched.len(),
                        "Compiled wildcard hierarchy rule"
                    );
                    matched
                }
            };

            edges.entry(rule.granting_role).or_default().extend(children);
        }

        Ok(Self {
            edges,
            memo: ReachabilityMemo::new(policy),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Transitive closure of `roles` over the rule graph
    fn expand(&self, roles: BTreeSet<String>) -> BTreeSet<String> {
        let mut reachable = roles;
        let mut pending: Vec<String> = reachable.iter().cloned().collect();
        let mut visited: HashSet<String> = HashSet::new();

        while let Some(role) = pending.pop() {
            let Some(children) = self.edges.get(&role) else {
                continue;
            };
            if !visited.insert(role) {
                continue;
            }
            for child in children {
                if reachable.insert(child.clone()) {
                    pending.push(child.clone());
                }
            }
        }

        reachable
    }
}

/// Memo statistics
#[derive(Debug, Clone, Default)]
pub struct MemoStats {
    /// Lookups answered from the memo
    pub hits: u64,
    /// Lookups that computed a closure
    pub misses: u64,
    /// Entries currently held
    pub entries: usize,
    /// Entry bound, if any
    pub capacity: Option<usize>,
}

impl MemoStats {
    /// Calculate memo hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Role hierarchy resolver
///
/// Starts unbuilt. `build` compiles the rules and swaps the result in
/// atomically; concurrent `reachable` calls see either the old or the new
/// hierarchy, never a mix. A failed build leaves the previous state in place.
///
/// # Thread Safety
///
/// Share it with `Arc`. The compiled rules are immutable; the memo is a
/// concurrent map.
pub struct HierarchyResolver {
    state: RwLock<Option<Arc<CompiledHierarchy>>>,
    memo_policy: MemoPolicy,
}

impl HierarchyResolver {
    /// Create an unbuilt resolver with an unbounded memo
    pub fn new() -> Self {
        Self::with_memo_policy(MemoPolicy::Unbounded)
    }

    /// Create an unbuilt resolver with the given memo bound
    pub fn with_memo_policy(memo_policy: MemoPolicy) -> Self {
        Self {
            state: RwLock::new(None),
            memo_policy,
        }
    }

    /// Compile `rules` against `known_roles` and replace the current hierarchy
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::InvalidHierarchyRule` for a malformed rule or an
    /// uncompilable pattern.
    pub fn build(&self, rules: &[HierarchyRuleSource], known_roles: &BTreeSet<String>) -> Result<()> {
        let compiled = CompiledHierarchy::compile(rules, known_roles, self.memo_policy)?;
        let granting_roles = compiled.edges.len();

        *self.state.write() = Some(Arc::new(compiled));

        info!(
            rules = rules.len(),
            granting_roles,
            known_roles = known_roles.len(),
            "Role hierarchy built"
        );
        Ok(())
    }

    /// Seal `registry` and build against its role names
    pub fn build_from_registry(&self, rules: &[HierarchyRuleSource], registry: &RoleRegistry) -> Result<()> {
        registry.seal();
        self.build(rules, &registry.names())
    }

    /// Build from the role names and hierarchy rules of a role source
    pub async fn build_from_source(&self, source: &dyn RoleSource) -> Result<()> {
        let known_roles = source.role_names().await?;
        let rules = source.hierarchy_rules().await?;
        self.build(&rules, &known_roles)
    }

    /// Whether `build` has succeeded at least once
    pub fn is_built(&self) -> bool {
        self.state.read().is_some()
    }

    fn current(&self) -> Result<Arc<CompiledHierarchy>> {
        self.state.read().clone().ok_or(AuthzError::NotBuilt)
    }

    /// Compiled children of a granting role
    pub fn children_of(&self, granting_role: &str) -> Result<Option<BTreeSet<String>>> {
        Ok(self.current()?.edges.get(granting_role).cloned())
    }

    /// Every role reachable from `roles`, including `roles` themselves
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::NotBuilt` before the first successful build.
    pub fn reachable<I, S>(&self, roles: I) -> Result<ReachableRoles>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let hierarchy = self.current()?;

        let roles: BTreeSet<String> = roles.into_iter().map(|r| r.as_ref().to_string()).collect();
        let key = memo_key(&roles);

        if let Some(cached) = hierarchy.memo.get(&key) {
            hierarchy.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(cached);
        }

        hierarchy.misses.fetch_add(1, Ordering::Relaxed);
        let assigned = roles.len();
        let reachable = hierarchy.expand(roles);
        debug!(assigned, reachable = reachable.len(), "Computed reachable roles");

        Ok(hierarchy.memo.insert(key, Arc::new(reachable)))
    }

    /// Memo statistics for the current build
    ///
    /// A rebuild starts from an empty memo with zeroed counters.
    pub fn memo_stats(&self) -> MemoStats {
        let capacity = self.memo_policy.capacity();

        match self.state.read().as_ref() {
            Some(hierarchy) => MemoStats {
                hits: hierarchy.hits.load(Ordering::Relaxed),
                misses: hierarchy.misses.load(Ordering::Relaxed),
                entries: hierarchy.memo.len(),
                capacity,
            },
            None => MemoStats {
                capacity,
                ..MemoStats::default()
            },
        }
    }
}

impl Default for HierarchyResolver {
    fn default() -> Self {
        Self::new()
    }
}
