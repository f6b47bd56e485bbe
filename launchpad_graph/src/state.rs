//! Typed shared state for graph runs.
//!
//! A graph's state is a flat record whose fields are all optional until some
//! node writes them. Nodes return a partial record of the same type; the
//! runtime merges it into the shared state key by key (last writer wins).

/// Flat state record with a closed, compile-time set of keys.
///
/// Implemented by the [`state_record!`](crate::state_record) macro; hand-written
/// impls must keep `KEYS` and `written_keys` consistent.
pub trait StateRecord: Clone + Default + Send + Sync + std::fmt::Debug + 'static {
    /// Every key of the record, in declaration order.
    const KEYS: &'static [&'static str];

    /// Keys that currently carry a value.
    fn written_keys(&self) -> Vec<&'static str>;

    /// Overwrite every key present in `update`.
    fn merge(&mut self, update: Self);

    fn has_key(key: &str) -> bool {
        Self::KEYS.contains(&key)
    }

    fn is_empty(&self) -> bool {
        self.written_keys().is_empty()
    }
}

/// Declare a state record.
///
/// Each field is written with its value type and stored as `Option<T>`:
///
/// ```ignore
/// state_record! {
///     pub struct CounterState {
///         count: u32,
///         label: String,
///     }
/// }
/// ```
#[macro_export]
macro_rules! state_record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, ::serde::Serialize, ::serde::Deserialize)]
        $vis struct $name {
            $(
                $(#[$fmeta])*
                #[serde(default, skip_serializing_if = "Option::is_none")]
                pub $field: Option<$ty>,
            )*
        }

        impl $crate::state::StateRecord for $name {
            const KEYS: &'static [&'static str] = &[$(stringify!($field)),*];

            fn written_keys(&self) -> Vec<&'static str> {
                let mut keys = Vec::new();
                $(
                    if self.$field.is_some() {
                        keys.push(stringify!($field));
                    }
                )*
                keys
            }

            fn merge(&mut self, update: Self) {
                $(
                    if let Some(value) = update.$field {
                        self.$field = Some(value);
                    }
                )*
            }
        }
    };
}
