//! # Event Classifier
//!
//! kube watchers report `Apply` and `Delete` plus relist markers, not the
//! create/update/delete model the admission policies are written against.
//! The classifier restores that model by remembering the metadata of every
//! object it has seen.
//!
//! - First sight of an object is a `Create`
//! - Later sights are an `Update` carrying the previous metadata
//! - `Delete` forgets the object
//! - A relist (`Init` .. `InitDone`) rebuilds the known set; objects that
//!   disappeared while the watch was down are reported as `Delete`

use futures::{Stream, StreamExt};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::Resource;
use kube_runtime::watcher;
use std::collections::HashMap;

/// A watch event in create/update/delete form
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedEvent<K> {
    Create(K),
    Update {
        /// Metadata of the object before this event
        old: ObjectMeta,
        new: K,
    },
    Delete(K),
}

impl<K> ClassifiedEvent<K> {
    /// The object as of this event
    pub fn object(&self) -> &K {
        match self {
            ClassifiedEvent::Create(obj) | ClassifiedEvent::Delete(obj) => obj,
            ClassifiedEvent::Update { new, .. } => new,
        }
    }

    pub fn into_object(self) -> K {
        match self {
            ClassifiedEvent::Create(obj) | ClassifiedEvent::Delete(obj) => obj,
            ClassifiedEvent::Update { new, .. } => new,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassifiedEvent::Create(_) => "create",
            ClassifiedEvent::Update { .. } => "update",
            ClassifiedEvent::Delete(_) => "delete",
        }
    }
}

/// Stateful translator from watcher events to [`ClassifiedEvent`]s
#[derive(Debug, Default)]
pub struct EventClassifier {
    known: HashMap<String, ObjectMeta>,
    /// Objects seen during an in-progress relist
    relist: Option<HashMap<String, ObjectMeta>>,
}

fn object_key(meta: &ObjectMeta) -> String {
    format!(
        "{}/{}",
        meta.namespace.as_deref().unwrap_or_default(),
        meta.name.as_deref().unwrap_or_default()
    )
}

fn snapshot(meta: &ObjectMeta) -> ObjectMeta {
    let mut meta = meta.clone();
    meta.managed_fields = None;
    meta
}

impl EventClassifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects currently remembered
    #[must_use]
    pub fn known_len(&self) -> usize {
        self.known.len()
    }

    /// Classify one watcher event
    ///
    /// Returns zero or more events: relist markers produce nothing except
    /// `InitDone`, which may report several deletions.
    pub fn classify<K>(&mut self, event: watcher::Event<K>) -> Vec<ClassifiedEvent<K>>
    where
        K: Resource + Default,
    {
        match event {
            watcher::Event::Apply(obj) => {
                vec![self.observe(obj)]
            }
            watcher::Event::Delete(obj) => {
                self.known.remove(&object_key(obj.meta()));
                vec![ClassifiedEvent::Delete(obj)]
            }
            watcher::Event::Init => {
                self.relist = Some(HashMap::new());
                Vec::new()
            }
            watcher::Event::InitApply(obj) => {
                let key = object_key(obj.meta());
                let meta = snapshot(obj.meta());
                let event = self.observe(obj);
                self.relist
                    .get_or_insert_with(HashMap::new)
                    .insert(key, meta);
                vec![event]
            }
            watcher::Event::InitDone => {
                let seen = self.relist.take().unwrap_or_default();
                let vanished: Vec<ObjectMeta> = self
                    .known
                    .iter()
                    .filter(|(key, _)| !seen.contains_key(*key))
                    .map(|(_, meta)| meta.clone())
                    .collect();
                self.known = seen;
                vanished
                    .into_iter()
                    .map(|meta| {
                        let mut obj = K::default();
                        *obj.meta_mut() = meta;
                        ClassifiedEvent::Delete(obj)
                    })
                    .collect()
            }
        }
    }

    fn observe<K: Resource>(&mut self, obj: K) -> ClassifiedEvent<K> {
        let key = object_key(obj.meta());
        match self.known.insert(key, snapshot(obj.meta())) {
            Some(old) => ClassifiedEvent::Update { old, new: obj },
            None => ClassifiedEvent::Create(obj),
        }
    }
}

/// Adapt a watcher stream into a stream of classified events
///
/// Watcher errors pass through untouched.
pub fn classified<K, S>(
    stream: S,
) -> impl Stream<Item = Result<ClassifiedEvent<K>, watcher::Error>> + Send
where
    K: Resource + Default + Send + 'static,
    S: Stream<Item = Result<watcher::Event<K>, watcher::Error>> + Send,
{
    stream
        .scan(EventClassifier::new(), |classifier, event| {
            let events: Vec<Result<ClassifiedEvent<K>, watcher::Error>> = match event {
                Ok(event) => classifier.classify(event).into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            };
            futures::future::ready(Some(futures::stream::iter(events)))
        })
        .flatten()
}
