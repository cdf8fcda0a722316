use ahash::{HashMap, HashMapExt};

pub type QueryKey = Vec<String>;

type KeyFn = Box<dyn Fn(&[&str]) -> QueryKey + Send + Sync>;

/// Named query key builders, so every query over the same action agrees on
/// its key.
///
/// ```
/// # use action_query::QueryKeyFactory;
/// let keys = QueryKeyFactory::new()
///     .with("posts", |_| vec!["posts".to_string()])
///     .with("post", |args| vec!["posts".to_string(), args[0].to_string()]);
///
/// assert_eq!(keys.key("post", &["42"]), Some(vec!["posts".to_string(), "42".to_string()]));
/// ```
#[derive(Default)]
pub struct QueryKeyFactory {
    builders: HashMap<&'static str, KeyFn>,
}

impl QueryKeyFactory {
    pub fn new() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    pub fn with<F>(mut self, name: &'static str, f: F) -> Self
    where
        F: Fn(&[&str]) -> QueryKey + Send + Sync + 'static,
    {
        self.builders.insert(name, Box::new(f));
        self
    }

    pub fn key(&self, name: &str, args: &[&str]) -> Option<QueryKey> {
        self.builders.get(name).map(|f| f(args))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }
}
