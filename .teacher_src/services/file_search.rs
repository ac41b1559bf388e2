//! File search service for RAG (Retrieval Augmented Generation).
//!
//! This service orchestrates searching across vector stores (vector stores)
//! and is used by the server-side `file_search` tool implementation.
//!
//! The service:
//! 1. Validates access to requested collections
//! 2. Generates query embeddings using the configured embedding provider
//! 3. Searches across one or more collections
//! 4. Returns ranked results with content and metadata

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::{
    cache::{
        EmbeddingService,
        vector_store::{HybridSearchConfig, RrfConfig, VectorBackend},
    },
    config::{CircuitBreakerConfig, RerankConfig, RetryConfig},
    db::{DbPool, ListParams},
    middleware::FileSearchAuthContext,
    models::{AttributeFilter, FileSearchRankingOptions, VectorStore, VectorStoreOwnerType},
    providers::{
        circuit_breaker::CircuitBreaker,
        retry::{is_retryable_database_error, with_circuit_breaker_and_retry_generic},
    },
    services::reranker::{RerankRequest, Reranker},
};

/// Configuration for the file search service.
#[derive(Debug, Clone)]
pub struct FileSearchServiceConfig {
    /// Default maximum results if not specified in request.
    pub default_max_results: usize,
    /// Default similarity threshold if not specified.
    pub default_threshold: f64,
    /// Retry configuration for vector store operations.
    pub retry: RetryConfig,
    /// Circuit breaker configuration for failing fast on unhealthy backends.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Configuration for re-ranking behavior.
    pub rerank: RerankConfig,
}

/// Errors that can occur during file search operations.
#[derive(Debug, Error)]
pub enum FileSearchError {
    /// VectorStore not found or access denied.
    #[error("VectorStore not found: {0}")]
    VectorStoreNotFound(Uuid),

    /// Access denied to vector_store.
    #[error("Access denied to vector store: {0}")]
    AccessDenied(Uuid),

    /// Vector stores have incompatible embedding configurations.
    #[error("Incompatible collections: {0}")]
    IncompatibleVectorStores(String),

    /// Embedding generation failed.
    #[error("Failed to generate embedding: {0}")]
    EmbeddingError(String),

    /// Vector search failed.
    #[error("Search failed: {0}")]
    SearchError(String),

    /// Database error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// No vector stores specified.
    #[error("No vector stores specified for search")]
    NoVectorStores,

    /// File search is not configured.
    #[error("File search is not configured")]
    NotConfigured,

    /// Circuit breaker is open - vector store is unhealthy.
    #[error("Vector store circuit breaker is open: {0}")]
    CircuitBreakerOpen(String),

    /// Re-ranking failed.
    #[error("Re-ranking failed: {0}")]
    RerankError(String),
}

/// A single search result from the file search.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FileSearchResult {
    /// The chunk ID in the vector store.
    pub chunk_id: Uuid,
    /// The vector store this chunk belongs to.
    pub vector_store_id: Uuid,
    /// The file this chunk was extracted from.
    pub file_id: Uuid,
    /// Index of this chunk within the file.
    pub chunk_index: i32,
    /// The actual text content of the chunk.
    pub content: String,
    /// Similarity score (0.0 to 1.0, higher is more similar).
    pub score: f64,
    /// Optional filename (resolved from file metadata).
    pub filename: Option<String>,
    /// Optional additional metadata.
    pub metadata: Option<serde_json::Value>,
}

/// Configuration for a file search request.
#[derive(Debug, Clone)]
pub struct FileSearchRequest {
    /// The search query text.
    pub query: String,
    /// VectorStore IDs to search across.
    pub vector_store_ids: Vec<Uuid>,
    /// Maximum number of results to return (default: 10).
    pub max_results: Option<usize>,
    /// Minimum similarity threshold (0.0 to 1.0, default: 0.7).
    pub threshold: Option<f64>,
    /// Optional file IDs to restrict search to.
    pub file_ids: Option<Vec<Uuid>>,
    /// Optional attribute filter for filtering results based on file attributes.
    pub filters: Option<AttributeFilter>,
    /// Optional ranking options controlling ranker algorithm and hybrid search.
    ///
    /// When `ranking_options.use_hybrid_search()` returns true, the search will
    /// combine vector (semantic) and keyword (BM25/full-text) search using
    /// Reciprocal Rank Fusion (RRF).
    pub ranking_options: Option<FileSearchRankingOptions>,
}

/// Response from a file search operation.
#[derive(Debug, Clone)]
pub struct FileSearchResponse {
    /// The search results, ordered by relevance (highest first).
    pub results: Vec<FileSearchResult>,
    /// The query that was searched for.
    pub query: String,
    /// Total number of collections searched.
    pub vector_stores_searched: usize,
}

/// Service for searching vector stores.
///
/// This is the core service that powers the `file_search` tool in the
/// Responses API. It handles:
/// - VectorStore access validation
/// - Query embedding generation
/// - Multi-vector store search
/// - Result ranking and formatting
/// - Optional LLM-based re-ranking
pub struct FileSearchService {
    db: Arc<DbPool>,
    embedding_service: Arc<EmbeddingService>,
    vector_store: Arc<dyn VectorBackend>,
    default_max_results: usize,
    default_threshold: f64,
    retry: RetryConfig,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
    /// Optional reranker for LLM-based result re-ranking.
    reranker: Option<Arc<dyn Reranker>>,
    /// Configuration for re-ranking behavior.
    rerank_config: RerankConfig,
}

impl FileSearchService {
    /// Create a new file search service.
    ///
    /// # Arguments
    /// * `db` - Database pool for vector store metadata lookups
    /// * `embedding_service` - Service for generating query embeddings
    /// * `vector_store` - Vector store for similarity search
    /// * `reranker` - Optional reranker for LLM-based result re-ranking
    /// * `config` - Service configuration (thresholds, retry, circuit breaker, rerank)
    pub fn new(
        db: Arc<DbPool>,
        embedding_service: Arc<EmbeddingService>,
        vector_store: Arc<dyn VectorBackend>,
        reranker: Option<Arc<dyn Reranker>>,
        config: FileSearchServiceConfig,
    ) -> Self {
        let circuit_breaker = if config.circuit_breaker.enabled {
            Some(Arc::new(CircuitBreaker::new(
                "file_search_vector_store",
                &config.circuit_breaker,
            )))
        } else {
            None
        };

        Self {
            db,
            embedding_service,
            vector_store,
            default_max_results: config.default_max_results,
            default_threshold: config.default_threshold,
            retry: config.retry,
            circuit_breaker,
            reranker,
            rerank_config: config.rerank,
        }
    }

    /// Get the vector store used by this service.
    ///
    /// This is useful for background tasks like cleanup that need
    /// to operate on the same vector store.
    pub fn vector_store(&self) -> Arc<dyn VectorBackend> {
        self.vector_store.clone()
    }

    /// Get the embedding service used by this service.
    ///
    /// This is useful for document processing that needs to generate
    /// embeddings with the same configuration as file search.
    pub fn embedding_service(&self) -> Arc<EmbeddingService> {
        self.embedding_service.clone()
    }

    /// Search across collections for content matching the query.
    ///
    /// # Arguments
    /// * `request` - The search request containing query, vector store IDs, and options
    /// * `auth` - Optional authentication context for access control validation
    ///
    /// # Returns
    /// Search results ordered by relevance, or an error.
    pub async fn search(
        &self,
        request: FileSearchRequest,
        auth: Option<FileSearchAuthContext>,
    ) -> Result<FileSearchResponse, FileSearchError> {
        if request.vector_store_ids.is_empty() {
            return Err(FileSearchError::NoVectorStores);
        }

        // 1. Validate collections exist and user has access
        let collections = self
            .validate_collections(&request.vector_store_ids, auth.as_ref())
            .await?;

        // 2. Validate all vector stores have compatible embedding configurations
        self.validate_embedding_compatibility(&collections)?;

        // 3. Generate embedding for the query
        let query_embedding = self
            .embedding_service
            .embed_text(&request.query)
            .await
            .map_err(|e| FileSearchError::EmbeddingError(e.to_string()))?;

        // 4. Search across collections
        let max_results = request.max_results.unwrap_or(self.default_max_results);
        let threshold = request.threshold.unwrap_or(self.default_threshold);

        // Build filter from file_ids and attribute filters
        let filter = if request.file_ids.is_some() || request.filters.is_some() {
            Some(crate::cache::vector_store::ChunkFilter {
                file_ids: request.file_ids.clone(),
                attribute_filter: request.filters.clone(),
            })
        } else {
            None
        };

        let vector_store_ids_str: Vec<Uuid> = request.vector_store_ids.clone();
        let vector_store = self.vector_store.clone();

        // Determine if hybrid search should be used
        let use_hybrid = request
            .ranking_options
            .as_ref()
            .is_some_and(|opts| opts.use_hybrid_search());

        // Search with circuit breaker and retry for transient errors
        let search_results = if use_hybrid {
            // Build HybridSearchConfig from ranking_options
            let hybrid_opts = request.ranking_options.as_ref().unwrap();
            let api_hybrid = hybrid_opts.hybrid_search.as_ref().unwrap();
            let hybrid_config = HybridSearchConfig {
                rrf: RrfConfig::weighted(api_hybrid.embedding_weight, api_hybrid.text_weight),
                vector_threshold: threshold,
            };

            let query_text = request.query.clone();

            with_circuit_breaker_and_retry_generic(
                self.circuit_breaker.as_deref(),
                &self.retry,
                "vector_store",
                "hybrid_search_vector_stores",
                |e: &crate::cache::vector_store::VectorStoreError| match e {
                    crate::cache::vector_store::VectorStoreError::Database(msg) => {
                        is_retryable_database_error(msg)
                    }
                    crate::cache::vector_store::VectorStoreError::Http(_) => true,
                    _ => false,
                },
                |_| false,
                || {
                    let ids = vector_store_ids_str.clone();
                    let emb = query_embedding.clone();
                    let q = query_text.clone();
                    let f = filter.clone();
                    let vs = vector_store.clone();
                    let cfg = hybrid_config.clone();
                    async move {
                        vs.hybrid_search_vector_stores(&ids, &q, &emb, max_results, cfg, f)
                            .await
                    }
                },
            )
            .await
        } else {
            // Vector-only search
            with_circuit_breaker_and_retry_generic(
                self.circuit_breaker.as_deref(),
                &self.retry,
                "vector_store",
                "search_vector_stores",
                |e: &crate::cache::vector_store::VectorStoreError| match e {
                    crate::cache::vector_store::VectorStoreError::Database(msg) => {
                        is_retryable_database_error(msg)
                    }
                    crate::cache::vector_store::VectorStoreError::Http(_) => true,
                    _ => false,
                },
                |_| false,
                || {
                    let ids = vector_store_ids_str.clone();
                    let emb = query_embedding.clone();
                    let f = filter.clone();
                    let vs = vector_store.clone();
                    async move {
                        vs.search_vector_stores(&ids, &emb, max_results, threshold, f)
                            .await
                    }
                },
            )
            .await
        };

        let search_results = search_results.map_err(|e| match e {
            crate::providers::retry::GenericRequestError::CircuitBreakerOpen(cb_err) => {
                FileSearchError::CircuitBreakerOpen(cb_err.to_string())
            }
            crate::providers::retry::GenericRequestError::Operation(op_err) => {
                FileSearchError::SearchError(op_err.to_string())
            }
        })?;

        // 5. Resolve filenames for results
        let results = self.resolve_filenames(search_results).await?;

        // 6. Apply LLM re-ranking if requested
        let use_llm_rerank = request
            .ranking_options
            .as_ref()
            .is_some_and(|opts| opts.effective_ranker().is_llm_rerank());

        let results = if use_llm_rerank {
            self.apply_reranking(&request.query, results, max_results)
                .await?
        } else {
            results
        };

        Ok(FileSearchResponse {
            results,
            query: request.query,
            vector_stores_searched: collections.len(),
        })
    }

    /// Apply LLM-based re-ranking to search results.
    ///
    /// If re-ranking is enabled and a reranker is available, this will pass the
    /// results through the LLM for relevance scoring. Falls back to original
    /// results if re-ranking is not configured or fails.
    async fn apply_reranking(
        &self,
        query: &str,
        results: Vec<FileSearchResult>,
        max_results: usize,
    ) -> Result<Vec<FileSearchResult>, FileSearchError> {
        // Check if re-ranking is enabled
        if !self.rerank_config.enabled {
            tracing::debug!(
                stage = "rerank_skipped",
                reason = "disabled",
                "LLM re-ranking requested but disabled in config, using vector scores"
            );
            return Ok(results);
        }

        // Check if we have a reranker
        let Some(ref reranker) = self.reranker else {
            tracing::warn!(
                stage = "rerank_skipped",
                reason = "no_reranker",
                "LLM re-ranking requested but no reranker configured, using vector scores"
            );
            return Ok(results);
        };

        // Check if reranker is available
        if !reranker.is_available() {
            tracing::warn!(
                stage = "rerank_skipped",
                reason = "unavailable",
                "LLM reranker is not available, using vector scores"
            );
            return Ok(results);
        }

        // Skip re-ranking for empty results
        if results.is_empty() {
            return Ok(results);
        }

        tracing::debug!(
            stage = "rerank_started",
            results_count = results.len(),
            max_results,
            "Applying LLM re-ranking"
        );

        // Clone results for fallback if configured to fall back on error
        let fallback_results = if self.rerank_config.fallback_on_error {
            Some(results.clone())
        } else {
            None
        };

        // Build rerank request
        let rerank_request = RerankRequest {
            query: query.to_string(),
            results,
            top_n: Some(max_results),
        };

        // Execute re-ranking
        match reranker.rerank(rerank_request).await {
            Ok(response) => {
                tracing::info!(
                    stage = "rerank_completed",
                    reranked_count = response.results.len(),
                    total_considered = response.total_considered,
                    model = ?response.model,
                    prompt_tokens = response.usage.as_ref().map(|u| u.prompt_tokens),
                    completion_tokens = response.usage.as_ref().map(|u| u.completion_tokens),
                    "LLM re-ranking completed"
                );

                // Extract the re-ranked results, updating scores
                Ok(response
                    .results
                    .into_iter()
                    .map(|ranked| {
                        let mut result = ranked.result;
                        result.score = ranked.relevance_score;
                        result
                    })
                    .collect())
            }
            Err(e) => {
                if let Some(original_results) = fallback_results {
                    tracing::warn!(
                        stage = "rerank_failed",
                        error = %e,
                        fallback = true,
                        "LLM re-ranking failed, returning results with original vector scores"
                    );
                    Ok(original_results)
                } else {
                    tracing::warn!(
                        stage = "rerank_failed",
                        error = %e,
                        fallback = false,
                        "LLM re-ranking failed, propagating error (fallback_on_error=false)"
                    );
                    Err(FileSearchError::RerankError(e.to_string()))
                }
            }
        }
    }

    /// Validate that all vector stores exist and user has access.
    async fn validate_collections(
        &self,
        vector_store_ids: &[Uuid],
        auth: Option<&FileSearchAuthContext>,
    ) -> Result<Vec<VectorStore>, FileSearchError> {
        let mut collections = Vec::with_capacity(vector_store_ids.len());

        for &id in vector_store_ids {
            let vector_store = self
                .db
                .vector_stores()
                .get_vector_store(id)
                .await
                .map_err(|e| FileSearchError::DatabaseError(e.to_string()))?
                .ok_or(FileSearchError::VectorStoreNotFound(id))?;

            // Check access if auth context is provided
            if let Some(auth) = auth {
                let has_access = self.check_vector_store_access(&vector_store, auth).await?;
                if !has_access {
                    return Err(FileSearchError::AccessDenied(id));
                }
            }

            collections.push(vector_store);
        }

        Ok(collections)
    }

    /// Check if the authenticated entity has access to a vector_store.
    ///
    /// This implements the same access control logic as `check_resource_access` in route handlers:
    /// - User-owned: user_id must match the owner
    /// - Org-owned: org_id matches OR identity_org_ids contains owner OR user is a member
    /// - Project-owned: project_id matches OR identity_project_ids contains owner OR user is a member
    async fn check_vector_store_access(
        &self,
        vector_store: &VectorStore,
        auth: &FileSearchAuthContext,
    ) -> Result<bool, FileSearchError> {
        match vector_store.owner_type {
            VectorStoreOwnerType::User => {
                // User-owned: user_id must match
                Ok(auth.user_id == Some(vector_store.owner_id))
            }
            VectorStoreOwnerType::Organization => {
                // 1. Check direct org ownership from API key
                if auth.org_id == Some(vector_store.owner_id) {
                    return Ok(true);
                }

                // 2. Check identity org membership (from OAuth/OIDC claims)
                if auth
                    .identity_org_ids
                    .contains(&vector_store.owner_id.to_string())
                {
                    return Ok(true);
                }

                // 3. Fall back to database membership check (for user_id)
                if let Some(user_id) = auth.user_id {
                    let members = self
                        .db
                        .users()
                        .list_org_members(vector_store.owner_id, ListParams::default())
                        .await
                        .map_err(|e| FileSearchError::DatabaseError(e.to_string()))?;
                    if members.items.iter().any(|u| u.id == user_id) {
                        return Ok(true);
                    }
                }

                Ok(false)
            }
            VectorStoreOwnerType::Team => {
                // Team access: check if user is a member of the team
                if let Some(user_id) = auth.user_id {
                    let members = self
                        .db
                        .teams()
                        .list_members(vector_store.owner_id, ListParams::default())
                        .await
                        .map_err(|e| FileSearchError::DatabaseError(e.to_string()))?;
                    if members.items.iter().any(|m| m.user_id == user_id) {
                        return Ok(true);
                    }
                }

                Ok(false)
            }
            VectorStoreOwnerType::Project => {
                // 1. Check direct project ownership from API key
                if auth.project_id == Some(vector_store.owner_id) {
                    return Ok(true);
                }

                // 2. Check identity project membership (from OAuth/OIDC claims)
                if auth
                    .identity_project_ids
                    .contains(&vector_store.owner_id.to_string())
                {
                    return Ok(true);
                }

                // 3. Fall back to database membership check (for user_id)
                if let Some(user_id) = auth.user_id {
                    let members = self
                        .db
                        .users()
                        .list_project_members(vector_store.owner_id, ListParams::default())
                        .await
                        .map_err(|e| FileSearchError::DatabaseError(e.to_string()))?;
                    if members.items.iter().any(|u| u.id == user_id) {
                        return Ok(true);
                    }
                }

                Ok(false)
            }
        }
    }

    /// Validate that all vector stores have compatible embedding configurations.
    fn validate_embedding_compatibility(
        &self,
        collections: &[VectorStore],
    ) -> Result<(), FileSearchError> {
        if collections.is_empty() {
            return Ok(());
        }

        let first = &collections[0];
        let expected_model = &first.embedding_model;
        let expected_dims = first.embedding_dimensions;

        for vs in collections.iter().skip(1) {
            if vs.embedding_model != *expected_model {
                return Err(FileSearchError::IncompatibleVectorStores(format!(
                    "VectorStore '{}' uses embedding model '{}', but '{}' uses '{}'",
                    vs.name, vs.embedding_model, first.name, expected_model
                )));
            }
            if vs.embedding_dimensions != expected_dims {
                return Err(FileSearchError::IncompatibleVectorStores(format!(
                    "VectorStore '{}' uses {} dimensions, but '{}' uses {}",
                    vs.name, vs.embedding_dimensions, first.name, expected_dims
                )));
            }
        }

        Ok(())
    }

    /// Resolve filenames for search results by looking up file metadata.
    async fn resolve_filenames(
        &self,
        search_results: Vec<crate::cache::vector_store::ChunkSearchResult>,
    ) -> Result<Vec<FileSearchResult>, FileSearchError> {
        let mut results = Vec::with_capacity(search_results.len());

        for chunk in search_results {
            // Try to get the filename from file metadata
            let filename = self
                .db
                .files()
                .get_file(chunk.file_id)
                .await
                .map_err(|e| FileSearchError::DatabaseError(e.to_string()))?
                .map(|f| f.filename);

            results.push(FileSearchResult {
                chunk_id: chunk.chunk_id,
                vector_store_id: chunk.vector_store_id,
                file_id: chunk.file_id,
                chunk_index: chunk.chunk_index,
                content: chunk.content,
                score: chunk.score,
                filename,
                metadata: chunk.metadata,
            });
        }

        Ok(results)
    }

    /// Get the default maximum results setting.
    pub fn default_max_results(&self) -> usize {
        self.default_max_results
    }

    /// Get the default threshold setting.
    pub fn default_threshold(&self) -> f64 {
        self.default_threshold
    }

    /// Get all chunks for a specific file.
    ///
    /// This is a Hadrian extension for debugging and admin UI purposes.
    /// Returns chunks ordered by chunk_index for sequential reading.
    ///
    /// # Arguments
    /// * `file_id` - The file ID to retrieve chunks for
    ///
    /// # Returns
    /// All chunks for the file, ordered by chunk_index.
    pub async fn get_chunks_by_file(
        &self,
        file_id: Uuid,
    ) -> Result<Vec<crate::cache::vector_store::StoredChunk>, FileSearchError> {
        self.vector_store
            .get_chunks_by_file(file_id)
            .await
            .map_err(|e| FileSearchError::SearchError(e.to_string()))
    }
}

impl std::fmt::Debug for FileSearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSearchService")
            .field("default_max_results", &self.default_max_results)
            .field("default_threshold", &self.default_threshold)
            .finish()
    }
}


// ============================================================================
// Access Control Integration Tests
// ============================================================================
//
// These tests verify that the middleware access control logic correctly enforces
// ownership and membership rules for vector store access via file_search tool calls.
//
// Test scenarios:
// 1. User-owned vector store: user_id must match owner
// 2. Org-owned vector store: org_id matches OR identity_org_ids contains owner OR user is org member
// 3. Project-owned vector store: project_id matches OR identity_project_ids contains owner OR user is project member
// 4. Access denied for mismatched ownership
