//! Version matcher
//!
//! Decides which repositories a publish event affects. A repository is
//! affected when the first dependency it declares under the published
//! package's name has a range that the published version satisfies.
//!
//! Direction: the *published version* must satisfy the *declared range*.
//! A publish below the declared floor, or past the range's ceiling, is not a
//! match.

use semver::{Version, VersionReq};

use crate::domain::publish::PublishEvent;
use crate::domain::repository::{DependencyDeclaration, Repository};

/// A repository affected by a publish event, with the declaration that matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match<'a> {
    pub repository: &'a Repository,
    pub dependency: &'a DependencyDeclaration,
}

/// A declared version range
///
/// Accepts Cargo syntax as-is and the common npm spellings on top of it:
/// whitespace-separated comparators, `a - b` hyphen ranges and `||`
/// alternatives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredRange {
    alternatives: Vec<VersionReq>,
}

impl DeclaredRange {
    pub fn parse(range: &str) -> Result<Self, semver::Error> {
        let alternatives = range
            .split("||")
            .map(parse_alternative)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { alternatives })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }
}

/// Whether `published` falls inside `range`. Unparsable ranges never match.
pub fn satisfies(published: &Version, range: &str) -> bool {
    DeclaredRange::parse(range)
        .map(|range| range.matches(published))
        .unwrap_or(false)
}

/// Filter `candidates` down to the repositories affected by `event`.
///
/// Parse failures are not errors: an unparsable published version matches
/// nothing, an unparsable declared range excludes only its repository.
/// Output order follows `candidates`.
pub fn match_repositories<'a>(event: &PublishEvent, candidates: &'a [Repository]) -> Vec<Match<'a>> {
    let Ok(published) = event.parsed_version() else {
        return Vec::new();
    };

    candidates
        .iter()
        .filter_map(|repository| {
            let dependency = repository.dependency(&event.package_name)?;
            satisfies(&published, &dependency.semver_range).then_some(Match {
                repository,
                dependency,
            })
        })
        .collect()
}

fn parse_alternative(alternative: &str) -> Result<VersionReq, semver::Error> {
    let alternative = alternative.trim();
    if alternative.is_empty() {
        return Ok(VersionReq::STAR);
    }

    match VersionReq::parse(alternative) {
        Ok(req) => Ok(req),
        Err(err) => match normalize_npm(alternative) {
            Some(normalized) => VersionReq::parse(&normalized),
            None => Err(err),
        },
    }
}

/// Rewrite an npm comparator set into Cargo syntax, if it looks like one.
fn normalize_npm(alternative: &str) -> Option<String> {
    let tokens: Vec<&str> = alternative.split_whitespace().collect();

    if let [low, "-", high] = tokens.as_slice() {
        return Some(format!(">={low}, <={high}"));
    }

    // ">= 1.0.0" is one comparator split by a space.
    let mut comparators: Vec<String> = Vec::new();
    let mut pending_op: Option<&str> = None;
    for token in tokens {
        if token.chars().all(|c| "<>=~^".contains(c)) {
            pending_op = Some(token);
            continue;
        }
        match pending_op.take() {
            Some(op) => comparators.push(format!("{op}{token}")),
            None => comparators.push(token.to_string()),
        }
    }

    if pending_op.is_some() || comparators.len() < 2 && !alternative.contains(' ') {
        return None;
    }

    Some(comparators.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repository::RepositoryConfig;
    use uuid::Uuid;

    fn repo(name: &str, deps: &[(&str, &str)]) -> Repository {
        Repository {
            id: Uuid::new_v4(),
            name: name.to_string(),
            dependencies: deps
                .iter()
                .map(|(n, r)| DependencyDeclaration::new(*n, *r))
                .collect(),
            config: RepositoryConfig::default(),
        }
    }

    fn names(matches: &[Match<'_>]) -> Vec<String> {
        matches.iter().map(|m| m.repository.name.clone()).collect()
    }

    #[test]
    fn test_unparsable_published_version_matches_nothing() {
        let candidates = vec![repo("app", &[("lodash", "*")]), repo("web", &[("lodash", "^4")])];
        let event = PublishEvent::new("lodash", "not-a-version", "npm");

        assert!(match_repositories(&event, &candidates).is_empty());
    }

    #[test]
    fn test_unparsable_range_excludes_only_that_repository() {
        let candidates = vec![
            repo("broken", &[("lodash", "definitely not a range")]),
            repo("app", &[("lodash", "^4.0.0")]),
        ];
        let event = PublishEvent::new("lodash", "4.17.0", "npm");

        assert_eq!(names(&match_repositories(&event, &candidates)), vec!["app"]);
    }

    #[test]
    fn test_first_declaration_wins() {
        // Second entry would match, first does not.
        let candidates = vec![repo("app", &[("lodash", "^3.0.0"), ("lodash", "^4.0.0")])];
        let event = PublishEvent::new("lodash", "4.17.0", "npm");
        assert!(match_repositories(&event, &candidates).is_empty());

        // First entry matches and is the one reported.
        let candidates = vec![repo("app", &[("lodash", "^4.0.0"), ("lodash", "^3.0.0")])];
        let matches = match_repositories(&event, &candidates);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].dependency.semver_range, "^4.0.0");
    }

    #[test]
    fn test_preserves_candidate_order() {
        let candidates = vec![
            repo("c", &[("lodash", "^4")]),
            repo("a", &[("lodash", "^4")]),
            repo("skip", &[("lodash", "^5")]),
            repo("b", &[("lodash", ">=4.0.0")]),
        ];
        let event = PublishEvent::new("lodash", "4.17.0", "npm");

        assert_eq!(names(&match_repositories(&event, &candidates)), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_repository_without_dependency_is_skipped() {
        let candidates = vec![repo("app", &[("underscore", "*")])];
        let event = PublishEvent::new("lodash", "4.17.0", "npm");

        assert!(match_repositories(&event, &candidates).is_empty());
    }

    #[test]
    fn test_published_version_must_satisfy_declared_range() {
        let declared = "4.17.0";

        // Inside the range: matches.
        assert!(satisfies(&Version::new(4, 17, 0), declared));
        assert!(satisfies(&Version::new(4, 18, 2), declared));

        // Below the declared version: a "published <= declared" comparison
        // would accept this, the range does not.
        assert!(!satisfies(&Version::new(4, 16, 0), declared));
        assert!(!satisfies(&Version::new(3, 0, 0), declared));

        // Past the range's ceiling.
        assert!(!satisfies(&Version::new(5, 0, 0), declared));
    }

    #[test]
    fn test_reversed_direction_is_not_used() {
        // With the declared version as the lower bound of an open range,
        // the reversed comparison (declared satisfies published) would flip
        // both outcomes.
        let declared = ">=2.0.0";
        assert!(satisfies(&Version::new(3, 0, 0), declared));
        assert!(!satisfies(&Version::new(1, 0, 0), declared));
    }

    #[test]
    fn test_npm_range_spellings() {
        let v = |s: &str| Version::parse(s).unwrap();

        assert!(satisfies(&v("1.5.0"), ">=1.0.0 <2.0.0"));
        assert!(!satisfies(&v("2.0.0"), ">=1.0.0 <2.0.0"));
        assert!(satisfies(&v("1.5.0"), ">= 1.0.0 < 2.0.0"));

        assert!(satisfies(&v("2.3.4"), "1.2.3 - 2.3.4"));
        assert!(!satisfies(&v("2.3.5"), "1.2.3 - 2.3.4"));

        assert!(satisfies(&v("1.9.0"), "^1.0.0 || ^3.0.0"));
        assert!(satisfies(&v("3.1.0"), "^1.0.0 || ^3.0.0"));
        assert!(!satisfies(&v("2.0.0"), "^1.0.0 || ^3.0.0"));

        assert!(satisfies(&v("1.2.9"), "~1.2.0"));
        assert!(satisfies(&v("0.0.1"), "*"));
        assert!(satisfies(&v("0.0.1"), ""));
    }

    #[test]
    fn test_garbage_range_is_rejected() {
        assert!(DeclaredRange::parse("latest and greatest").is_err());
        assert!(DeclaredRange::parse(">=").is_err());
    }
}
