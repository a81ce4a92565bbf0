//! Supervisor — turns resolved config into per-session resources.
//!
//! Process-wide pieces (LLM provider, parameter store, memory service,
//! gateway URL cache, agent card) are built once in [`Supervisor::new`].
//! Everything that depends on a caller's identity is built in
//! [`SessionInitializer::initialize`], which the session registry runs at
//! most once per session:
//!
//! ```text
//! monitor    memory hooks + gateway tools → chat agent, built eagerly
//! websearch  web search + memory hooks → chat agent, built lazily by the task executor
//! host       peer clients → routing host agent, built eagerly
//! ```

use std::sync::Arc;

use tracing::{info, warn};

use crate::a2a::{AgentCard, AgentSkill};
use crate::config::{Config, Role, with_region};
use crate::error::AppError;
use crate::identity::workload::WorkloadExchange;
use crate::identity::{TokenExchange, TokenProvider};
use crate::llm::{LlmProvider, providers};
use crate::params::ParameterStore;
use crate::subsystems::agents::{
    AgentFactory, AgentFuture, AgentHook, ChatAgent, ConversationalAgent, HostAgent, MemoryHooks,
    prebuilt,
};
use crate::subsystems::comms::a2a_app::{A2aState, a2a_router};
use crate::subsystems::comms::{InitFuture, ServerState, SessionInitializer, SessionResources};
use crate::subsystems::gateway::{GatewayClient, GatewayUrl};
use crate::subsystems::memory::service::MemoryService;
use crate::subsystems::memory::{MemoryStore, build_service};
use crate::subsystems::peers::{PeerAgent, PeerClient, resolve_target};
use crate::subsystems::sessions::{SessionKey, SessionRegistry};
use crate::subsystems::tasks::{TaskExecutor, TaskStore};
use crate::subsystems::tools::{web_search, TavilyClient, WebSearch, WebSearchHook};

const MONITOR_CONTEXT_LABEL: &str = "Monitoring Context";

#[derive(Clone)]
pub struct Supervisor {
    config: Arc<Config>,
    llm: LlmProvider,
    params: Arc<dyn ParameterStore>,
    exchange: Arc<dyn TokenExchange>,
    memory: Option<Arc<dyn MemoryService>>,
    web_search: Option<Arc<dyn WebSearch>>,
    gateway_url: Arc<GatewayUrl>,
    card: Arc<AgentCard>,
}

impl Supervisor {
    pub fn new(config: Config, params: Arc<dyn ParameterStore>) -> Result<Self, AppError> {
        let llm = providers::build(&config.llm, config.llm_api_key.clone())
            .map_err(|e| AppError::Config(e.to_string()))?;

        let endpoint = with_region(&config.identity.endpoint, config.region());
        let exchange: Arc<dyn TokenExchange> =
            Arc::new(WorkloadExchange::new(&endpoint, config.identity.timeout_seconds)?);

        let memory = match config.runtime.role {
            Role::Monitor | Role::Websearch => Some(build_service(&config.memory)?),
            Role::Host => None,
        };

        let web_search: Option<Arc<dyn WebSearch>> = match config.runtime.role {
            Role::Websearch if config.websearch.api_key.is_some() => {
                Some(Arc::new(TavilyClient::new(&config.websearch)?))
            }
            Role::Websearch => {
                warn!("TAVILY_API_KEY not set, websearch role runs without the search tool");
                None
            }
            _ => None,
        };

        let skills = config
            .agent
            .skills
            .iter()
            .map(|s| AgentSkill {
                id: s.id.clone(),
                name: s.name.clone(),
                description: s.description.clone(),
                tags: s.tags.clone(),
                examples: s.examples.clone(),
            })
            .collect();
        let card = AgentCard::for_runtime(
            &config.agent.name,
            &config.agent.description,
            &config.http.public_url,
            env!("CARGO_PKG_VERSION"),
            skills,
        );

        info!(
            role = config.runtime.role.as_str(),
            agent = %config.agent.name,
            llm = %config.llm.provider,
            "supervisor ready"
        );

        Ok(Self {
            gateway_url: Arc::new(GatewayUrl::new(&config.gateway.url_param)),
            config: Arc::new(config),
            llm,
            params,
            exchange,
            memory,
            web_search,
            card: Arc::new(card),
        })
    }

    /// Replace the workload token exchange.
    pub fn with_token_exchange(mut self, exchange: Arc<dyn TokenExchange>) -> Self {
        self.exchange = exchange;
        self
    }

    /// Replace the memory service.
    pub fn with_memory_service(mut self, memory: Arc<dyn MemoryService>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Replace the web-search backend.
    pub fn with_web_search(mut self, search: Arc<dyn WebSearch>) -> Self {
        self.web_search = Some(search);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn card(&self) -> &AgentCard {
        &self.card
    }

    /// Router state backed by this supervisor.
    pub fn server_state(&self, registry: Arc<SessionRegistry<SessionResources>>) -> ServerState {
        ServerState {
            agent_name: Arc::from(self.config.agent.name.as_str()),
            default_actor: Arc::from(self.config.runtime.default_actor_id.as_str()),
            registry,
            initializer: Arc::new(self.clone()),
        }
    }

    fn memory_parts(&self) -> Result<(Arc<dyn MemoryService>, String), AppError> {
        let service = self
            .memory
            .clone()
            .ok_or_else(|| AppError::Config("memory service not configured".into()))?;
        let memory_id = self
            .config
            .memory
            .memory_id
            .clone()
            .ok_or_else(|| AppError::Config("missing MEMORY_ID environment variable".into()))?;
        Ok((service, memory_id))
    }

    async fn monitor_agent(&self, key: &SessionKey, tokens: Arc<TokenProvider>) -> Result<AgentFactory, AppError> {
        let (service, memory_id) = self.memory_parts()?;
        let memory = MemoryStore::connect(service, &memory_id).await?;
        let hooks = MemoryHooks::new(memory, &key.actor_id, &key.session_id)
            .with_limits(self.config.memory.top_k, self.config.memory.history_turns)
            .with_context_label(MONITOR_CONTEXT_LABEL);

        let provider = self
            .config
            .identity
            .gateway_provider
            .as_deref()
            .ok_or_else(|| AppError::Config("missing GATEWAY_PROVIDER_NAME environment variable".into()))?;
        let url = self.gateway_url.resolve(self.params.as_ref()).await?;
        let gateway = GatewayClient::new(&url, provider, tokens, self.config.gateway.timeout_seconds)?;
        let tools = gateway.list_tools().await?;
        info!(session_id = %key.session_id, tools = tools.len(), "gateway tools loaded");

        let hooks: Vec<Arc<dyn AgentHook>> = vec![Arc::new(hooks)];
        let agent = ChatAgent::create(self.llm.clone(), &self.config.agent.system_prompt, &tools, hooks).await;
        Ok(prebuilt(Arc::new(agent)))
    }

    fn websearch_factory(&self) -> Result<AgentFactory, AppError> {
        let (service, memory_id) = self.memory_parts()?;
        let llm = self.llm.clone();
        let prompt = self.config.agent.system_prompt.clone();
        let (top_k, history) = (self.config.memory.top_k, self.config.memory.history_turns);
        let search = self.web_search.clone();
        let (search_top_k, recency_days) = (self.config.websearch.top_k, self.config.websearch.recency_days);

        Ok(Arc::new(move |session_id: String, actor_id: String| -> AgentFuture<'static, Arc<dyn ConversationalAgent>> {
            let service = service.clone();
            let memory_id = memory_id.clone();
            let llm = llm.clone();
            let prompt = prompt.clone();
            let search = search.clone();
            Box::pin(async move {
                let memory = MemoryStore::connect(service, &memory_id).await?;
                let mut tools = Vec::new();
                // Search runs first so it sees the question before memory context is prepended.
                let mut hooks: Vec<Arc<dyn AgentHook>> = Vec::new();
                if let Some(search) = search {
                    tools.push(web_search::descriptor());
                    hooks.push(Arc::new(WebSearchHook::new(search, search_top_k).with_recency_days(recency_days)));
                }
                hooks.push(Arc::new(MemoryHooks::new(memory, &actor_id, &session_id).with_limits(top_k, history)));
                let agent = ChatAgent::create(llm, &prompt, &tools, hooks).await;
                Ok(Arc::new(agent) as Arc<dyn ConversationalAgent>)
            })
        }))
    }

    fn host_agent(&self, key: &SessionKey, tokens: Arc<TokenProvider>) -> Result<AgentFactory, AppError> {
        let mut peers: Vec<Arc<dyn PeerAgent>> = Vec::new();
        for peer in &self.config.peers.agents {
            let target = resolve_target(&self.config.peers, peer, self.params.as_ref())?;
            info!(peer = %target.name, "peer agent resolved");
            let client = PeerClient::new(target, tokens.clone(), &key.session_id, self.config.peers.timeout_seconds)?;
            peers.push(Arc::new(client));
        }
        let host = HostAgent::new(self.llm.clone(), &self.config.agent.system_prompt, peers)?;
        Ok(prebuilt(Arc::new(host)))
    }

    async fn build_session(&self, key: SessionKey) -> Result<SessionResources, AppError> {
        let tokens = Arc::new(TokenProvider::new(self.exchange.clone(), key.identity_token.clone()));

        let factory = match self.config.runtime.role {
            Role::Monitor => self.monitor_agent(&key, tokens.clone()).await?,
            Role::Websearch => self.websearch_factory()?,
            Role::Host => self.host_agent(&key, tokens.clone())?,
        };

        let app = a2a_router(A2aState {
            card: self.card.clone(),
            executor: Arc::new(TaskExecutor::new(factory)),
            tasks: Arc::new(TaskStore::new()),
            session_id: Arc::from(key.session_id.as_str()),
            actor_id: Arc::from(key.actor_id.as_str()),
        });
        Ok(SessionResources { tokens, app })
    }
}

impl SessionInitializer for Supervisor {
    fn initialize(&self, key: SessionKey) -> InitFuture {
        let this = self.clone();
        Box::pin(async move { this.build_session(key).await })
    }
}
