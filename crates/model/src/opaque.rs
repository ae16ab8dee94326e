use std::any::Any;
use std::fmt::{self, Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A provider-specific message carried through the conversation untouched.
///
/// Some providers need their own assistant message back verbatim (for
/// example an assistant turn that carries tool calls must precede the tool
/// results). The agent stores such messages as `OpaqueMessage` and hands
/// them back to the provider on the next request; only the provider knows
/// the concrete type inside.
///
/// Identity is the `id`: two opaque messages compare equal iff their ids do.
#[derive(Clone)]
pub struct OpaqueMessage {
    id: Arc<str>,
    value: Arc<dyn Any + Send + Sync>,
}

impl OpaqueMessage {
    /// Wraps `value` under the conversation-unique `id`.
    #[inline]
    pub fn new<ID: Into<String>, T: Send + Sync + 'static>(
        id: ID,
        value: T,
    ) -> Self {
        Self {
            id: Arc::from(id.into()),
            value: Arc::new(value),
        }
    }

    /// Returns the message id.
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the wrapped value if it is a `T`.
    #[inline]
    pub fn to_raw<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }
}

impl Debug for OpaqueMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OpaqueMessage").field(&self.id).finish()
    }
}

impl PartialEq for OpaqueMessage {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for OpaqueMessage {}

impl Hash for OpaqueMessage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[derive(Debug, PartialEq)]
    struct ProviderMessage {
        content: String,
    }

    #[test]
    fn test_downcast() {
        let opaque = OpaqueMessage::new(
            "chatcmpl-1",
            ProviderMessage {
                content: "Hello".to_owned(),
            },
        );
        assert_eq!(opaque.id(), "chatcmpl-1");
        assert_eq!(
            opaque.to_raw::<ProviderMessage>().unwrap().content,
            "Hello"
        );
        assert!(opaque.to_raw::<String>().is_none());
    }

    #[test]
    fn test_identity_is_id() {
        let first = OpaqueMessage::new("a", 1_u32);
        let same_id = OpaqueMessage::new("a", "different payload");
        let other = OpaqueMessage::new("b", 1_u32);
        assert_eq!(first, same_id);
        assert_ne!(first, other);

        let set: HashSet<_> = [first, same_id, other].into_iter().collect();
        assert_eq!(set.len(), 2);
    }
}
