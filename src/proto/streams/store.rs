use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::frame::StreamId;
use crate::proto::streams::StreamInner;

/// Storage for live streams.
///
/// Membership means the peer still considers the stream open and it has not
/// been locally reset or completed. Lookup and removal are safe from any
/// task; `drain_above` is only called while the transport lock is held so
/// the snapshot cannot race stream-id assignment (lock order: transport
/// state first, then the store).
#[derive(Debug, Default)]
pub(crate) struct Store {
    ids: Mutex<HashMap<StreamId, Arc<StreamInner>>>,
}

impl Store {
    pub fn new() -> Store {
        Store::default()
    }

    pub fn insert(&self, id: StreamId, stream: Arc<StreamInner>) {
        let prev = self.ids.lock().unwrap().insert(id, stream);
        assert!(prev.is_none(), "duplicate stream id {:?}", id);
    }

    pub fn get(&self, id: StreamId) -> Option<Arc<StreamInner>> {
        self.ids.lock().unwrap().get(&id).cloned()
    }

    /// Removes the stream, returning it if the id was present.
    pub fn remove(&self, id: StreamId) -> Option<Arc<StreamInner>> {
        self.ids.lock().unwrap().remove(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.lock().unwrap().is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.lock().unwrap().len()
    }

    /// Removes and returns every stream with an id above `last`, ordered by
    /// id so failure delivery is deterministic.
    pub fn drain_above(&self, last: StreamId) -> Vec<(StreamId, Arc<StreamInner>)> {
        let mut ids = self.ids.lock().unwrap();

        let mut drained: Vec<_> = ids
            .iter()
            .filter(|(id, _)| **id > last)
            .map(|(id, _)| *id)
            .collect();
        drained.sort();

        drained
            .into_iter()
            .map(|id| (id, ids.remove(&id).unwrap()))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::deframe::LengthPrefixedDeframer;
    use crate::proto::streams::StreamListener;
    use crate::status::Status;

    use bytes::Bytes;
    use http::HeaderMap;

    struct Noop;

    impl StreamListener for Noop {
        fn on_headers(&mut self, _: HeaderMap) {}
        fn on_message(&mut self, _: Bytes) {}
        fn on_close(&mut self, _: Status, _: HeaderMap) {}
    }

    fn stream() -> Arc<StreamInner> {
        StreamInner::spawn(Box::new(Noop), Box::new(LengthPrefixedDeframer::new()))
    }

    #[tokio::test]
    async fn insert_get_remove() {
        let store = Store::new();

        store.insert(StreamId::new(3), stream());
        store.insert(StreamId::new(5), stream());

        assert_eq!(store.len(), 2);
        assert!(store.get(StreamId::new(5)).is_some());
        assert!(store.get(StreamId::new(7)).is_none());

        assert!(store.remove(StreamId::new(5)).is_some());
        assert!(store.remove(StreamId::new(5)).is_none());
        assert!(!store.is_empty());
    }

    #[tokio::test]
    async fn drain_above_removes_in_order() {
        let store = Store::new();

        for id in [3, 5, 7, 9] {
            store.insert(StreamId::new(id), stream());
        }

        let drained = store.drain_above(StreamId::new(5));
        let ids: Vec<_> = drained.iter().map(|(id, _)| id.as_u32()).collect();

        assert_eq!(ids, vec![7, 9]);
        assert_eq!(store.len(), 2);
    }
}
