/// Static host metadata attached once per outgoing batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvironmentTags {
    tags: Vec<(String, String)>,
}

impl EnvironmentTags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tag; blank values are skipped and repeated keys overwrite.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        let key = key.into();
        match self.tags.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.tags.push((key, value.to_string())),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvironmentTags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut tags = EnvironmentTags::new();
        for (key, value) in iter {
            tags.insert(key, value);
        }
        tags
    }
}
