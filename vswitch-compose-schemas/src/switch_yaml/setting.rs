use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A declared value that may be left to the platform. `Unset` means the platform inherits the
/// value from its parent (or keeps what it already has), `Override` means the configuration
/// pins it. This is distinct from the zero value of `T`, an `Override(false)` is a real
/// override.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Setting<T> {
    Unset,
    Override(T),
}

// manual impl so that `T` does not need to be `Default`
impl<T> Default for Setting<T> {
    fn default() -> Self {
        Setting::Unset
    }
}

impl<T> Setting<T> {
    pub fn is_unset(&self) -> bool {
        matches!(self, Setting::Unset)
    }

    pub fn is_override(&self) -> bool {
        !self.is_unset()
    }

    pub fn as_option(&self) -> Option<&T> {
        match self {
            Setting::Unset => None,
            Setting::Override(v) => Some(v),
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Setting::Unset => None,
            Setting::Override(v) => Some(v),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Setting<U> {
        match self {
            Setting::Unset => Setting::Unset,
            Setting::Override(v) => Setting::Override(f(v)),
        }
    }
}

impl<T: Clone> Setting<T> {
    /// Overlay this setting onto `fallback`, keeping `self` when it is an override.
    pub fn or(&self, fallback: &Setting<T>) -> Setting<T> {
        match self {
            Setting::Override(_) => self.clone(),
            Setting::Unset => fallback.clone(),
        }
    }

    pub fn unwrap_or(&self, default: T) -> T {
        match self {
            Setting::Override(v) => v.clone(),
            Setting::Unset => default,
        }
    }
}

impl<T> From<Option<T>> for Setting<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            None => Setting::Unset,
            Some(v) => Setting::Override(v),
        }
    }
}

impl<T: Serialize> Serialize for Setting<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Setting::Unset => serializer.serialize_none(),
            Setting::Override(v) => serializer.serialize_some(v),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Setting<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Setting::from)
    }
}
