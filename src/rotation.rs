/// One target URL or an ordered failover list.
///
/// Attempt `n` uses entry `min(n, len - 1)`, so a short list still works
/// with a larger attempt budget: once the list runs out, the last URL is
/// reused.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Targets(Vec<String>);

impl Targets {
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(urls.into_iter().map(Into::into).collect())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns the URL for the 0-based `attempt`.
    pub fn for_attempt(&self, attempt: usize) -> Option<&str> {
        select(&self.0, attempt).map(String::as_str)
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

/// Picks the entry for the 0-based `attempt`, reusing the last entry once
/// the slice is exhausted.
pub fn select<T>(items: &[T], attempt: usize) -> Option<&T> {
    let last = items.len().checked_sub(1)?;
    items.get(attempt.min(last))
}

impl From<&str> for Targets {
    fn from(url: &str) -> Self {
        Self(vec![url.to_owned()])
    }
}

impl From<String> for Targets {
    fn from(url: String) -> Self {
        Self(vec![url])
    }
}

impl From<&String> for Targets {
    fn from(url: &String) -> Self {
        Self(vec![url.clone()])
    }
}

impl From<reqwest::Url> for Targets {
    fn from(url: reqwest::Url) -> Self {
        Self(vec![url.into()])
    }
}

impl From<Vec<String>> for Targets {
    fn from(urls: Vec<String>) -> Self {
        Self(urls)
    }
}

impl From<Vec<&str>> for Targets {
    fn from(urls: Vec<&str>) -> Self {
        Self::new(urls)
    }
}

impl From<&[&str]> for Targets {
    fn from(urls: &[&str]) -> Self {
        Self::new(urls.iter().copied())
    }
}

impl<const N: usize> From<[&str; N]> for Targets {
    fn from(urls: [&str; N]) -> Self {
        Self::new(urls)
    }
}

impl<const N: usize> From<[String; N]> for Targets {
    fn from(urls: [String; N]) -> Self {
        Self::new(urls)
    }
}
