use vfm_explorer::{RefreshSignal, TreeProvider, TreeView};
use vfm_targets::{
    AdbBridge, PipelineSink, RetrievalError, RetrievalHistory, RetrievalOutcome,
    RetrievalPipeline, RetrievalRequest,
};
use vfm_util::AppConfig;

/// Everything the commands share. Built once in `main` and passed down.
pub(crate) struct AppContext {
    pub(crate) config: AppConfig,
    pub(crate) refresh: RefreshSignal,
    pub(crate) explorer: TreeProvider,
    pub(crate) actions: TreeProvider,
    pub(crate) pipeline: RetrievalPipeline,
    pub(crate) history: RetrievalHistory,
}

impl AppContext {
    pub(crate) fn new(config: AppConfig) -> Self {
        let bridge = AdbBridge::system(config.adb_override());
        Self::with_parts(config, bridge, RetrievalHistory::default_location())
    }

    pub(crate) fn with_parts(
        config: AppConfig,
        bridge: AdbBridge,
        history: RetrievalHistory,
    ) -> Self {
        let refresh = RefreshSignal::new();
        let explorer = TreeProvider::filesystem(config.log_root_path());
        let pipeline = RetrievalPipeline::new(bridge)
            .with_refresh(refresh.clone())
            .with_history(history.clone());
        Self {
            config,
            refresh,
            explorer,
            actions: TreeProvider::actions(),
            pipeline,
            history,
        }
    }

    pub(crate) fn explorer_view(&self) -> TreeView {
        TreeView::new(self.explorer.clone(), &self.refresh)
    }

    pub(crate) fn actions_view(&self) -> TreeView {
        TreeView::new(self.actions.clone(), &self.refresh)
    }

    /// Pulls the configured remote log directory into the browsed root.
    pub(crate) fn retrieval_request(&self) -> RetrievalRequest {
        RetrievalRequest::new(
            self.config.remote_log_dir.trim(),
            self.config.log_root_path(),
        )
    }

    pub(crate) async fn trigger_retrieval(
        &self,
        sink: &dyn PipelineSink,
    ) -> Result<RetrievalOutcome, RetrievalError> {
        self.pipeline.run(&self.retrieval_request(), sink).await
    }
}
