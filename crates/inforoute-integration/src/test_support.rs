//! Fakes shared by the unit tests of this crate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use inforoute_middleware::{EventBus, RoadFeed};
use inforoute_runtime::Coordinator;
use inforoute_types::{FetchError, RoadItem};

/// Replays queued results; repeats the last one when the queue runs dry.
pub struct ScriptedFeed {
    script: Mutex<VecDeque<Result<Vec<RoadItem>, FetchError>>>,
    last: Mutex<Result<Vec<RoadItem>, FetchError>>,
    calls: AtomicUsize,
}

impl ScriptedFeed {
    pub fn new(script: Vec<Result<Vec<RoadItem>, FetchError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(Ok(Vec::new())),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoadFeed for ScriptedFeed {
    async fn fetch(&self) -> Result<Vec<RoadItem>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(result) => {
                *self.last.lock().unwrap() = result.clone();
                result
            }
            None => self.last.lock().unwrap().clone(),
        }
    }
}

pub fn coordinator(feed: Arc<ScriptedFeed>) -> Arc<Coordinator> {
    Arc::new(Coordinator::new(
        "test",
        feed,
        Duration::from_secs(600),
        EventBus::default(),
    ))
}

pub fn road(tifid: &str, lib: &str, color: &str, address: &str) -> RoadItem {
    RoadItem {
        tifid: Some(tifid.to_string()),
        lib: Some(lib.to_string()),
        color: Some(color.to_string()),
        type_geom: Some("LINE".to_string()),
        address: Some(address.to_string()),
        ..RoadItem::default()
    }
}
