use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Where the cost data for a usage record came from
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CostPricingSource {
    /// Upstream API reported cost (e.g. OpenRouter's `cost` field)
    Provider,
    /// From `[providers.*.models]` in hadrian.toml
    ProviderConfig,
    /// From `[pricing]` section in hadrian.toml
    PricingConfig,
    /// From models.dev catalog
    Catalog,
    /// No cost available
    #[default]
    None,
}

impl CostPricingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provider => "provider",
            Self::ProviderConfig => "provider_config",
            Self::PricingConfig => "pricing_config",
            Self::Catalog => "catalog",
            Self::None => "none",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "provider" => Self::Provider,
            "provider_config" => Self::ProviderConfig,
            "pricing_config" => Self::PricingConfig,
            "catalog" => Self::Catalog,
            _ => Self::None,
        }
    }
}

impl std::fmt::Display for CostPricingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source preference for cost calculation
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum CostSource {
    /// Prefer provider-reported cost (from API response), fall back to calculated
    #[default]
    PreferProvider,
    /// Always use calculated cost based on configured pricing
    CalculatedOnly,
    /// Always use provider-reported cost, fail if not available
    ProviderOnly,
}

/// Pricing information for a specific model.
///
/// Costs are stored in microcents (1/10000 of a cent) for precision.
/// For example, $0.000002 per token = 0.0002 cents = 0.02 microcents.
///
/// This allows representing very small costs like:
/// - OpenRouter's Gemini 3 Pro: $0.000002/token = 0.02 microcents
/// - Cache read pricing: $0.0000002/token = 0.002 microcents
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
pub struct ModelPricing {
    /// Cost per 1M input tokens in microcents (divide by 10000 for cents)
    /// Using per-1M to match provider APIs and avoid floating point
    #[serde(default)]
    pub input_per_1m_tokens: i64,

    /// Cost per 1M output tokens in microcents
    #[serde(default)]
    pub output_per_1m_tokens: i64,

    /// Cost per image (for vision models) in microcents (fallback for image_pricing)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_image: Option<i64>,

    /// Per-image cost by quality and size, keyed as `"quality:size"` (e.g. `"hd:1024x1024"`).
    /// Supports wildcards: `"*:1024x1024"`, `"hd:*"`, `"*:*"`.
    /// Falls back to `per_image` when no key matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pricing: Option<HashMap<String, i64>>,

    /// Cost per request in microcents (some providers charge per-request)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_request: Option<i64>,

    /// Cost per 1M cached input tokens (for providers that support caching)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_input_per_1m_tokens: Option<i64>,

    /// Cost per 1M cache write tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_write_per_1m_tokens: Option<i64>,

    /// Cost per 1M internal reasoning tokens (for reasoning models)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_per_1m_tokens: Option<i64>,

    /// Cost per second of audio (for transcription/translation) in microcents
    /// Example: Whisper at $0.006/min = $0.0001/sec = 100 microcents/sec
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_second: Option<i64>,

    /// Cost per 1M characters (for TTS) in microcents
    /// Example: tts-1 at $0.015/1K chars = $15/1M chars = 15_000_000 microcents/1M
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_1m_characters: Option<i64>,
}

impl ModelPricing {
    /// Create pricing from per-1k-token costs in cents (legacy format)
    ///
    /// The input values are in HUNDREDTHS of a cent (0.01 cent) per 1k tokens.
    /// This was the old format where:
    /// - 3000 = $0.03/1k = 3 cents/1k
    /// - 50 = $0.0005/1k = 0.05 cents/1k
    ///
    /// Convert to microcents per 1M:
    /// value * 1000 (1k->1M) * 100 (hundredths->microcents) = value * 100_000
    pub fn from_cents_per_1k(input_per_1k: i64, output_per_1k: i64) -> Self {
        Self {
            input_per_1m_tokens: input_per_1k * 100_000,
            output_per_1m_tokens: output_per_1k * 100_000,
            ..Default::default()
        }
    }

    /// Create pricing from per-token costs in dollars (provider API format like OpenRouter)
    /// OpenRouter uses strings like "0.000002" for $/token
    ///
    /// Example: $0.000002/token = $2/1M tokens = 200 cents/1M = 2_000_000 microcents/1M
    pub fn from_dollars_per_token(input: f64, output: f64) -> Self {
        // $/token -> microcents/1M
        // $/token * 1_000_000 tokens * 100 cents/$ * 10000 microcents/cent
        // = $/token * 1_000_000_000_000
        let input_microcents = (input * 1_000_000_000_000.0).round() as i64;
        let output_microcents = (output * 1_000_000_000_000.0).round() as i64;

        Self {
            input_per_1m_tokens: input_microcents,
            output_per_1m_tokens: output_microcents,
            ..Default::default()
        }
    }

    /// Create pricing for image generation models (per-image pricing)
    ///
    /// Example: DALL-E 3 at $0.04/image = 40_000 microcents/image
    pub fn from_dollars_per_image(dollars_per_image: f64) -> Self {
        Self {
            per_image: Some(dollars_to_microcents(dollars_per_image)),
            ..Default::default()
        }
    }

    /// Create pricing from an image pricing table
    ///
    /// Keys are `"quality:size"` strings (e.g. `"hd:1024x1024"`).
    /// Supports wildcards: `"*:1024x1024"`, `"hd:*"`, `"*:*"`.
    pub fn from_image_pricing_table(table: HashMap<String, i64>) -> Self {
        Self {
            image_pricing: Some(table),
            ..Default::default()
        }
    }

    /// Resolve per-image price using the image_pricing table with wildcard fallback.
    ///
    /// Lookup order:
    /// 1. Exact match: `"hd:1024x1024"`
    /// 2. Quality wildcard: `"*:1024x1024"`
    /// 3. Size wildcard: `"hd:*"`
    /// 4. Full wildcard: `"*:*"`
    /// 5. Fallback: `per_image`
    pub fn resolve_image_price(&self, quality: Option<&str>, size: Option<&str>) -> Option<i64> {
        if let Some(table) = &self.image_pricing {
            let q = quality.unwrap_or("*");
            let s = size.unwrap_or("*");

            // 1. Exact match
            let exact = format!("{q}:{s}");
            if let Some(&price) = table.get(&exact) {
                return Some(price);
            }
            // 2. Quality wildcard
            let qw = format!("*:{s}");
            if let Some(&price) = table.get(&qw) {
                return Some(price);
            }
            // 3. Size wildcard
            let sw = format!("{q}:*");
            if let Some(&price) = table.get(&sw) {
                return Some(price);
            }
            // 4. Full wildcard
            if let Some(&price) = table.get("*:*") {
                return Some(price);
            }
        }
        // 5. Fallback
        self.per_image
    }

    /// Create pricing for audio transcription/translation (per-minute pricing)
    ///
    /// Example: Whisper at $0.006/min = 6_000 microcents/min = 100 microcents/sec
    pub fn from_dollars_per_minute(dollars_per_minute: f64) -> Self {
        // Convert $/min to microcents/sec
        let microcents_per_minute = dollars_to_microcents(dollars_per_minute);
        let microcents_per_second = microcents_per_minute / 60;
        Self {
            per_second: Some(microcents_per_second),
            ..Default::default()
        }
    }

    /// Create pricing for TTS (per-character pricing)
    ///
    /// Example: tts-1 at $0.015/1K chars = $15/1M chars = 15_000_000 microcents/1M
    pub fn from_dollars_per_1k_characters(dollars_per_1k: f64) -> Self {
        // Convert $/1K to microcents/1M
        let microcents_per_1m = dollars_to_microcents(dollars_per_1k * 1000.0);
        Self {
            per_1m_characters: Some(microcents_per_1m),
            ..Default::default()
        }
    }
}

/// Token usage breakdown for cost calculation
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cached_tokens: Option<i64>,
    pub reasoning_tokens: Option<i64>,
    pub image_count: Option<i64>,
    /// Image size string (e.g. `"1024x1024"`) for size-aware pricing
    pub image_size: Option<String>,
    /// Image quality string (e.g. `"hd"`) for quality-aware pricing
    pub image_quality: Option<String>,
    /// Audio duration in seconds (for transcription/translation pricing)
    pub audio_seconds: Option<i64>,
    /// Character count (for TTS pricing)
    pub character_count: Option<i64>,
}

impl TokenUsage {
    pub fn new(input_tokens: i64, output_tokens: i64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            ..Default::default()
        }
    }

    /// Create usage for image generation with optional size and quality for
    /// size/quality-aware pricing lookup.
    pub fn for_images(image_count: i64, size: Option<&str>, quality: Option<&str>) -> Self {
        Self {
            image_count: Some(image_count),
            image_size: size.map(String::from),
            image_quality: quality.map(String::from),
            ..Default::default()
        }
    }

    /// Create usage for audio transcription/translation
    pub fn for_audio_seconds(seconds: i64) -> Self {
        Self {
            audio_seconds: Some(seconds),
            ..Default::default()
        }
    }

    /// Create usage for TTS (text-to-speech)
    pub fn for_tts_characters(characters: i64) -> Self {
        Self {
            character_count: Some(characters),
            ..Default::default()
        }
    }
}

/// Pricing configuration for all providers and models
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
pub struct PricingConfig {
    /// Pricing by provider and model
    /// Structure: pricing[provider][model] = ModelPricing
    #[serde(default)]
    pub pricing: HashMap<String, HashMap<String, ModelPricing>>,

    /// Cost source preference for usage tracking
    #[serde(default)]
    pub cost_source: CostSource,

    /// Runtime catalog for fallback pricing lookups (not serialized)
    #[serde(skip)]
    #[cfg_attr(feature = "json-schema", schemars(skip))]
    catalog: Option<crate::catalog::ModelCatalogRegistry>,

    /// Maps Hadrian provider names to catalog provider IDs (not serialized)
    #[serde(skip)]
    #[cfg_attr(feature = "json-schema", schemars(skip))]
    provider_catalog_map: HashMap<String, String>,

    /// Tracks the source of each pricing entry: source_map[provider][model] -> CostPricingSource
    #[serde(skip)]
    #[cfg_attr(feature = "json-schema", schemars(skip))]
    source_map: HashMap<String, HashMap<String, CostPricingSource>>,
}

impl PricingConfig {
    /// Get pricing for a specific provider and model
    pub fn get(&self, provider: &str, model: &str) -> Option<&ModelPricing> {
        self.pricing.get(provider)?.get(model)
    }

    /// Calculate cost in microcents for given token usage (simple version)
    pub fn calculate_cost(
        &self,
        provider: &str,
        model: &str,
        input_tokens: i64,
        output_tokens: i64,
    ) -> Option<(i64, CostPricingSource)> {
        self.calculate_cost_detailed(
            provider,
            model,
            &TokenUsage::new(input_tokens, output_tokens),
        )
    }

    /// Calculate cost in microcents for detailed token usage
    ///
    /// Returns `(cost_microcents, source)` where source indicates where
    /// the pricing data came from.
    ///
    /// First checks the pre-populated pricing HashMap, then falls back to
    /// a runtime catalog lookup for models not in `allowed_models`.
    pub fn calculate_cost_detailed(
        &self,
        provider: &str,
        model: &str,
        usage: &TokenUsage,
    ) -> Option<(i64, CostPricingSource)> {
        if let Some(pricing) = self.get(provider, model) {
            let source = self.get_source(provider, model);
            return Some((Self::compute_cost(pricing, usage), source));
        }
        if let Some(pricing) = self.lookup_catalog(provider, model) {
            return Some((
                Self::compute_cost(&pricing, usage),
                CostPricingSource::Catalog,
            ));
        }
        None
    }

    /// Look up pricing from the runtime catalog for a provider/model pair.
    fn lookup_catalog(&self, provider: &str, model: &str) -> Option<ModelPricing> {
        let catalog = self.catalog.as_ref()?;
        let catalog_provider_id = self.provider_catalog_map.get(provider)?;
        catalog.get_pricing(catalog_provider_id, model)
    }

    /// Compute cost in microcents from pricing and token usage.
    ///
    /// Uses `i128` for intermediate calculations to prevent overflow with
    /// large token counts (billions of tokens) and high pricing values.
    /// Results are saturated to `i64::MAX` if they would overflow.
    fn compute_cost(pricing: &ModelPricing, usage: &TokenUsage) -> i64 {
        let mut total_microcents: i128 = 0;

        // Input tokens (subtract cached if applicable)
        let regular_input = usage
            .cached_tokens
            .map(|c| usage.input_tokens.saturating_sub(c))
            .unwrap_or(usage.input_tokens);
        total_microcents +=
            (regular_input as i128 * pricing.input_per_1m_tokens as i128) / 1_000_000;

        // Output tokens
        total_microcents +=
            (usage.output_tokens as i128 * pricing.output_per_1m_tokens as i128) / 1_000_000;

        // Cached input tokens (if pricing available)
        if let (Some(cached), Some(cached_price)) =
            (usage.cached_tokens, pricing.cached_input_per_1m_tokens)
        {
            total_microcents += (cached as i128 * cached_price as i128) / 1_000_000;
        }

        // Reasoning tokens
        if let (Some(reasoning), Some(reasoning_price)) =
            (usage.reasoning_tokens, pricing.reasoning_per_1m_tokens)
        {
            total_microcents += (reasoning as i128 * reasoning_price as i128) / 1_000_000;
        }

        // Per-image cost (with size/quality-aware lookup)
        if let Some(images) = usage.image_count
            && let Some(image_price) = pricing
                .resolve_image_price(usage.image_quality.as_deref(), usage.image_size.as_deref())
        {
            total_microcents += images as i128 * image_price as i128;
        }

        // Per-second cost (audio transcription/translation)
        if let (Some(seconds), Some(second_price)) = (usage.audio_seconds, pricing.per_second) {
            total_microcents += seconds as i128 * second_price as i128;
        }

        // Per-character cost (TTS)
        if let (Some(chars), Some(char_price)) = (usage.character_count, pricing.per_1m_characters)
        {
            total_microcents += (chars as i128 * char_price as i128) / 1_000_000;
        }

        // Per-request cost
        if let Some(request_price) = pricing.per_request {
            total_microcents += request_price as i128;
        }

        // Saturate to i64::MAX if result would overflow
        saturate_to_i64(total_microcents)
    }

    /// Add or update pricing for a model with source tracking
    pub fn set_pricing_with_source(
        &mut self,
        provider: &str,
        model: &str,
        pricing: ModelPricing,
        source: CostPricingSource,
    ) {
        self.pricing
            .entry(provider.to_string())
            .or_default()
            .insert(model.to_string(), pricing);
        self.source_map
            .entry(provider.to_string())
            .or_default()
            .insert(model.to_string(), source);
    }

    /// Add or update pricing for a model (without source tracking)
    pub fn set_pricing(&mut self, provider: &str, model: &str, pricing: ModelPricing) {
        self.set_pricing_with_source(provider, model, pricing, CostPricingSource::None);
    }

    /// Get the pricing source for a specific provider and model
    pub fn get_source(&self, provider: &str, model: &str) -> CostPricingSource {
        self.source_map
            .get(provider)
            .and_then(|models| models.get(model))
            .copied()
            .unwrap_or(CostPricingSource::None)
    }

    /// Merge another pricing config into this one (other takes precedence)
    pub fn merge(&mut self, other: &PricingConfig) {
        for (provider, models) in &other.pricing {
            for (model, pricing) in models {
                self.set_pricing_with_source(
                    provider,
                    model,
                    pricing.clone(),
                    CostPricingSource::PricingConfig,
                );
            }
        }
    }

    /// Merge pricing from provider configurations
    pub fn merge_provider_config(&mut self, providers: &crate::config::ProvidersConfig) {
        for (provider_name, provider_config) in providers.iter() {
            for (model_name, model_config) in provider_config.models() {
                self.set_pricing_with_source(
                    provider_name,
                    model_name,
                    model_config.pricing.clone(),
                    CostPricingSource::ProviderConfig,
                );
            }
        }
    }

    /// Merge pricing from the model catalog.
    ///
    /// This loads pricing for all models in the catalog, keyed by the Hadrian
    /// provider name (not the catalog provider ID). The caller must provide
    /// a mapping from provider names to catalog provider IDs.
    pub fn merge_catalog(
        &mut self,
        catalog: &crate::catalog::ModelCatalogRegistry,
        providers: &crate::config::ProvidersConfig,
    ) {
        for (provider_name, provider_config) in providers.iter() {
            // Resolve the catalog provider ID for this Hadrian provider
            let catalog_provider_id = crate::catalog::resolve_catalog_provider_id(
                provider_config.provider_type_name(),
                provider_config.base_url(),
                provider_config.catalog_provider(),
            );

            if let Some(catalog_pid) = catalog_provider_id {
                // For each model the provider might have, check if catalog has pricing
                // Since we don't know all models upfront, we need a different approach:
                // The catalog lookup is done at runtime when calculating cost.
                // Here we can pre-populate for known models if the provider has an allowed_models list.
                for model_name in provider_config.allowed_models() {
                    if let Some(enrichment) = catalog.lookup(&catalog_pid, model_name) {
                        // Only set if not already configured
                        if self.get(provider_name, model_name).is_none() {
                            self.set_pricing_with_source(
                                provider_name,
                                model_name,
                                enrichment.pricing.clone(),
                                CostPricingSource::Catalog,
                            );
                        }
                    }
                }
            }
        }
    }

    /// Create a pricing config from config file + provider configs + optional catalog
    pub fn from_config(config: &PricingConfig, providers: &crate::config::ProvidersConfig) -> Self {
        Self::from_config_with_catalog(config, providers, None)
    }

    /// Create a pricing config with catalog fallback.
    ///
    /// Priority chain (highest to lowest):
    /// 1. Per-provider `models` in provider config
    /// 2. Explicit `[pricing]` section in config
    /// 3. models.dev catalog pricing (pre-populated for `allowed_models`, runtime fallback for others)
    /// 4. At runtime: provider-reported cost (via `CostSource::PreferProvider`)
    pub fn from_config_with_catalog(
        config: &PricingConfig,
        providers: &crate::config::ProvidersConfig,
        catalog: Option<&crate::catalog::ModelCatalogRegistry>,
    ) -> Self {
        // Build provider-name → catalog-provider-ID mapping for runtime fallback
        let mut provider_catalog_map = HashMap::new();
        for (provider_name, provider_config) in providers.iter() {
            if let Some(catalog_pid) = crate::catalog::resolve_catalog_provider_id(
                provider_config.provider_type_name(),
                provider_config.base_url(),
                provider_config.catalog_provider(),
            ) {
                provider_catalog_map.insert(provider_name.to_string(), catalog_pid);
            }
        }

        let mut result = Self {
            cost_source: config.cost_source,
            catalog: catalog.cloned(),
            provider_catalog_map,
            ..Default::default()
        };

        // First: load catalog pricing as base layer for allowed_models (lowest priority)
        if let Some(cat) = catalog {
            result.merge_catalog(cat, providers);
        }

        // Second: merge explicit pricing config (overrides catalog)
        result.merge(config);

        // Third: merge provider-specific pricing (highest priority, overrides everything)
        result.merge_provider_config(providers);

        result
    }

    /// Resolve cost based on cost_source preference
    ///
    /// Takes provider-reported cost (in dollars) and calculated cost with source.
    /// Returns `(cost_microcents, pricing_source)` based on the configured preference.
    pub fn resolve_cost(
        &self,
        provider_cost_dollars: Option<f64>,
        calculated: Option<(i64, CostPricingSource)>,
    ) -> (Option<i64>, CostPricingSource) {
        match self.cost_source {
            CostSource::PreferProvider => {
                if let Some(dollars) = provider_cost_dollars {
                    (
                        Some(dollars_to_microcents(dollars)),
                        CostPricingSource::Provider,
                    )
                } else if let Some((cost, src)) = calculated {
                    (Some(cost), src)
                } else {
                    (None, CostPricingSource::None)
                }
            }
            CostSource::CalculatedOnly => {
                if let Some((cost, src)) = calculated {
                    (Some(cost), src)
                } else {
                    (None, CostPricingSource::None)
                }
            }
            CostSource::ProviderOnly => {
                if let Some(dollars) = provider_cost_dollars {
                    (
                        Some(dollars_to_microcents(dollars)),
                        CostPricingSource::Provider,
                    )
                } else {
                    (None, CostPricingSource::None)
                }
            }
        }
    }
}

/// Convert dollars to microcents (1/1,000,000 of a dollar)
///
/// Examples:
/// - $1.00 = 1,000,000 microcents
/// - $0.01 = 10,000 microcents
/// - $0.000207 = 207 microcents
pub fn dollars_to_microcents(dollars: f64) -> i64 {
    (dollars * 1_000_000.0).round() as i64
}

/// Convert microcents to dollars
pub fn microcents_to_dollars(microcents: i64) -> f64 {
    microcents as f64 / 1_000_000.0
}

/// Saturate an i128 value to fit in an i64
///
/// Returns `i64::MAX` if the value exceeds the i64 range, or the value as i64 otherwise.
/// Negative values that underflow return `i64::MIN`.
fn saturate_to_i64(value: i128) -> i64 {
    if value > i64::MAX as i128 {
        i64::MAX
    } else if value < i64::MIN as i128 {
        i64::MIN
    } else {
        value as i64
    }
}
