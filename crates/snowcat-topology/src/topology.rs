//! `Topology`: owns the stage DAG, derives `childIndex`/`roots`, runs the
//! lazy per-stream initialization handshake, and drives finalization once
//! every stage has reported finished (spec.md §4.4).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use snowcat_backend::KvBackend;
use snowcat_core::{Error, StageName, StreamId};
use snowcat_state::Bag;
use tokio::time::sleep;

use crate::dag;
use crate::finalizer::Finalizer;
use crate::stage::Stage;

const INIT_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct Topology {
    backend: Arc<dyn KvBackend>,
    stages: HashMap<String, Arc<dyn Stage>>,
    child_index: HashMap<String, Vec<StageName>>,
    roots: Vec<StageName>,
    finalizers: Vec<Box<dyn Finalizer>>,
}

pub struct TopologyBuilder {
    backend: Arc<dyn KvBackend>,
    stages: Vec<Box<dyn Stage>>,
    finalizers: Vec<Box<dyn Finalizer>>,
}

impl Topology {
    pub fn builder(backend: Arc<dyn KvBackend>) -> TopologyBuilder {
        TopologyBuilder {
            backend,
            stages: Vec::new(),
            finalizers: Vec::new(),
        }
    }

    pub fn stage(&self, name: &str) -> Option<Arc<dyn Stage>> {
        self.stages.get(name).cloned()
    }

    pub fn roots(&self) -> &[StageName] {
        &self.roots
    }

    pub fn children_of(&self, stage: &StageName) -> &[StageName] {
        self.child_index
            .get(stage.as_str())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn stage_names(&self) -> Vec<String> {
        self.stages.keys().cloned().collect()
    }

    fn bag(&self, stream: &StreamId) -> Bag {
        Bag::new(self.backend.clone(), stream)
    }

    /// Lazy, once-per-stream initialization handshake (spec.md §4.4):
    /// exactly one activation across the fleet runs every root stage's
    /// (and transitively its children's) `initialize`; everyone else
    /// polls until it finishes.
    #[tracing::instrument(level = "debug", skip(self), fields(stream = %stream))]
    pub async fn initialize_if_needed(&self, stream: &StreamId) -> Result<(), Error> {
        let bag = self.bag(stream);

        if bag.get::<bool>("init_finished", false).await? {
            return Ok(());
        }

        let already_started = bag.get_or_set("init_started", &true).await?.unwrap_or(false);
        if !already_started {
            self.run_initializers(stream).await?;
            bag.set("init_finished", &true).await?;
            return Ok(());
        }

        loop {
            if bag.get::<bool>("init_finished", false).await? {
                return Ok(());
            }
            sleep(INIT_POLL_INTERVAL).await;
        }
    }

    async fn run_initializers(&self, stream: &StreamId) -> Result<(), Error> {
        for root in &self.roots {
            self.initialize_subtree(root, stream).await?;
        }
        Ok(())
    }

    fn initialize_subtree<'a>(
        &'a self,
        name: &'a StageName,
        stream: &'a StreamId,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), Error>> + 'a>> {
        Box::pin(async move {
            let stage = self
                .stage(name.as_str())
                .ok_or_else(|| Error::NotFound(format!("stage '{name}'")))?;
            stage.initialize(stream).await?;
            for child in self.children_of(name) {
                self.initialize_subtree(child, stream).await?;
            }
            Ok(())
        })
    }

    /// Atomically adds `stage` to the stream's finished-stage set and
    /// runs finalization if every stage in the topology is now present
    /// (spec.md §4.5 "Completion flagging").
    #[tracing::instrument(level = "debug", skip(self), fields(stream = %stream, stage = %stage))]
    pub async fn flag_finished(&self, stage: &StageName, stream: &StreamId) -> Result<(), Error> {
        let bag = self.bag(stream);
        let mut finished: std::collections::HashSet<String> =
            bag.get("finished_stages", Default::default()).await?;
        let inserted = finished.insert(stage.to_string());
        if !inserted {
            return Ok(());
        }
        bag.set("finished_stages", &finished).await?;

        let all: std::collections::HashSet<String> = self.stages.keys().cloned().collect();
        if finished == all {
            self.finalize(stream).await?;
        }
        Ok(())
    }

    /// Runs each finalizer in order; an error aborts the remaining ones
    /// (SPEC_FULL §5 Open Question decision).
    #[tracing::instrument(level = "info", skip(self), fields(stream = %stream))]
    pub async fn finalize(&self, stream: &StreamId) -> Result<(), Error> {
        for finalizer in &self.finalizers {
            finalizer.finalize(stream).await?;
        }
        Ok(())
    }
}

impl TopologyBuilder {
    pub fn stage(mut self, stage: Box<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn finalizer(mut self, finalizer: Box<dyn Finalizer>) -> Self {
        self.finalizers.push(finalizer);
        self
    }

    pub fn build(self) -> Result<Topology, Error> {
        dag::validate(&self.stages)?;

        let mut child_index: HashMap<String, Vec<StageName>> = HashMap::new();
        let mut roots = Vec::new();
        let mut stages = HashMap::new();

        for stage in &self.stages {
            child_index.entry(stage.name().to_string()).or_default();
            if stage.dependencies().is_empty() {
                roots.push(stage.name().clone());
            }
            for dep in stage.dependencies() {
                child_index
                    .entry(dep.to_string())
                    .or_default()
                    .push(stage.name().clone());
            }
        }

        for stage in self.stages {
            stages.insert(stage.name().to_string(), Arc::from(stage));
        }

        Ok(Topology {
            backend: self.backend,
            stages,
            child_index,
            roots,
            finalizers: self.finalizers,
        })
    }
}
