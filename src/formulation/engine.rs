//! Formulation engine: the end-to-end pipeline.
//!
//! `profile + target → accords → draft → directives → validation → metrics`.
//! Reference data is loaded once and shared read-only; every request runs
//! the whole pipeline and either yields a validated formula or fails as a
//! unit.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};

use super::assembler::{AssemblyReport, FormulaAssembler};
use super::compliance::{ComplianceTable, ComplianceValidator};
use super::metrics::compute_metrics;
use crate::catalog::IngredientCatalog;
use crate::config::{RetrievalMode, Settings};
use crate::emotion::{EmotionMapper, WeightedAccords};
use crate::molecular::MolecularPropertyCalculator;
use crate::rag::{
    create_retriever, KeywordRetriever, RankingOptions, RetrievalOutcome, RuleCorpus,
    RuleRetriever,
};
use crate::types::{
    BiochemicalProfile, ComplianceResult, CorrectionDirective, DraftFormula, EmotionalTarget,
    Formula, NoteClass, NotePyramid,
};
use crate::utilities::errors::FormulationError;

/// What happened inside one pipeline run. Never affects the result.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineDiagnostics {
    pub accords_label: String,
    pub accords: WeightedAccords,
    /// Mode that produced the directives.
    pub retrieval_mode: RetrievalMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub directives: Vec<CorrectionDirective>,
    #[serde(flatten)]
    pub assembly: AssemblyReport,
    pub elapsed_ms: u64,
}

/// A validated formula with its compliance result and run diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct FormulationOutput {
    pub formula: Formula,
    pub compliance: ComplianceResult,
    pub diagnostics: PipelineDiagnostics,
}

/// Sequences emotion mapping, retrieval, assembly and validation.
pub struct FormulationEngine {
    settings: Settings,
    catalog: Arc<IngredientCatalog>,
    corpus: Arc<RuleCorpus>,
    calculator: Arc<MolecularPropertyCalculator>,
    mapper: EmotionMapper,
    retriever: Arc<dyn RuleRetriever>,
    keyword: KeywordRetriever,
    assembler: FormulaAssembler,
    validator: ComplianceValidator,
}

impl FormulationEngine {
    /// Load reference data and build the pipeline.
    ///
    /// # Errors
    /// Fails on missing or invalid data files, an empty catalog, a catalog
    /// without a neutral ingredient for every note class, or an empty rule
    /// corpus.
    pub fn from_settings(settings: Settings) -> Result<Self, FormulationError> {
        let data_dir = settings.data_dir.as_deref();
        let catalog = IngredientCatalog::load(data_dir)?;
        let corpus = RuleCorpus::load(data_dir)?;
        let table = ComplianceTable::load(data_dir)?;
        Self::from_parts(settings, catalog, corpus, table)
    }

    pub fn from_parts(
        settings: Settings,
        catalog: IngredientCatalog,
        corpus: RuleCorpus,
        table: ComplianceTable,
    ) -> Result<Self, FormulationError> {
        if corpus.is_empty() {
            return Err(FormulationError::CorpusEmpty);
        }
        let calculator = Arc::new(MolecularPropertyCalculator::new());
        let mismatches = catalog.audit_note_classes(&calculator);
        if mismatches > 0 {
            log::info!("{mismatches} catalog entries sit outside their volatility band");
        }

        let catalog = Arc::new(catalog);
        let corpus = Arc::new(corpus);
        let retriever = create_retriever(&settings, corpus.clone());
        let keyword =
            KeywordRetriever::new(corpus.clone(), RankingOptions::from(&settings.retrieval));
        let assembler = FormulaAssembler::new(
            catalog.clone(),
            calculator.clone(),
            settings.formulation.max_ingredients_per_class,
        );
        let validator = ComplianceValidator::new(
            table,
            catalog.clone(),
            calculator.clone(),
            settings.compliance.clone(),
        );

        log::info!(
            "Formulation engine ready: {} ingredients, {} rules, {} retrieval",
            catalog.len(),
            corpus.len(),
            retriever.mode()
        );
        Ok(Self {
            settings,
            catalog,
            corpus,
            calculator,
            mapper: EmotionMapper::new(),
            retriever,
            keyword,
            assembler,
            validator,
        })
    }

    /// Replace the configured retriever.
    pub fn with_retriever(mut self, retriever: Arc<dyn RuleRetriever>) -> Self {
        self.retriever = retriever;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn catalog(&self) -> &IngredientCatalog {
        &self.catalog
    }

    pub fn corpus(&self) -> &RuleCorpus {
        &self.corpus
    }

    pub fn calculator(&self) -> &MolecularPropertyCalculator {
        &self.calculator
    }

    pub fn retrieval_mode(&self) -> RetrievalMode {
        self.retriever.mode()
    }

    /// Run the full pipeline.
    pub async fn generate_formula(
        &self,
        profile: &BiochemicalProfile,
        target: &EmotionalTarget,
    ) -> Result<(Formula, ComplianceResult), FormulationError> {
        let output = self.generate_formula_traced(profile, target).await?;
        Ok((output.formula, output.compliance))
    }

    /// Run the full pipeline and keep the diagnostics.
    pub async fn generate_formula_traced(
        &self,
        profile: &BiochemicalProfile,
        target: &EmotionalTarget,
    ) -> Result<FormulationOutput, FormulationError> {
        let started = Instant::now();

        let accords = self.mapper.map(target.valence(), target.arousal());
        log::debug!(
            "valence {:.2} arousal {:.2} -> {}",
            target.valence(),
            target.arousal(),
            accords.label()
        );

        let outcome = self.retrieve(profile).await?;
        let (draft, assembly) = self
            .assembler
            .assemble_with_report(&accords, &outcome.directives);
        let (composition, compliance) = self.validator.validate(&draft);
        let metrics = compute_metrics(&composition, &compliance, &self.catalog);

        let name = formula_name(target.prompt());
        let description = describe(&accords, &composition, profile);
        let formula = Formula {
            formula_id: uuid::Uuid::new_v4().to_string(),
            fingerprint: fingerprint(&composition),
            name,
            description,
            note_pyramid: NotePyramid::of(&composition),
            composition,
            metrics,
            generated_at: Utc::now(),
        };

        let diagnostics = PipelineDiagnostics {
            accords_label: accords.label(),
            accords,
            retrieval_mode: outcome.mode,
            fallback_reason: outcome.fallback_reason,
            directives: outcome.directives,
            assembly,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        log::info!(
            "Generated {} ({} ingredients, valid={}, {} retrieval, {} ms)",
            formula.name,
            formula.ingredient_count(),
            compliance.valid,
            diagnostics.retrieval_mode,
            diagnostics.elapsed_ms
        );
        Ok(FormulationOutput {
            formula,
            compliance,
            diagnostics,
        })
    }

    /// Validate a caller-supplied draft.
    pub fn validate(&self, draft: &DraftFormula) -> (DraftFormula, ComplianceResult) {
        self.validator.validate(draft)
    }

    async fn retrieve(
        &self,
        profile: &BiochemicalProfile,
    ) -> Result<RetrievalOutcome, FormulationError> {
        match self.retriever.retrieve(profile).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                log::warn!("Retrieval failed ({err}); falling back to keyword mode");
                let mut outcome = self.keyword.retrieve(profile).await?;
                outcome.fallback_reason = Some(err.to_string());
                Ok(outcome)
            }
        }
    }
}

/// Name chosen from the prompt's wording.
pub fn formula_name(prompt: Option<&str>) -> String {
    let prompt = prompt.unwrap_or_default().to_lowercase();
    if prompt.contains("fresh") {
        "Morning Dew".to_string()
    } else if prompt.contains("warm") || prompt.contains("cozy") {
        "Golden Hour".to_string()
    } else {
        "Aether Signature".to_string()
    }
}

/// SHA-256 over names and concentrations rounded to 4 decimals, top to base.
pub fn fingerprint(formula: &DraftFormula) -> String {
    let mut hasher = Sha256::new();
    for (_, entry) in formula.entries() {
        hasher.update(format!("{}:{:.4};", entry.name(), entry.concentration_pct));
    }
    hex::encode(hasher.finalize())
}

fn describe(
    accords: &WeightedAccords,
    formula: &DraftFormula,
    profile: &BiochemicalProfile,
) -> String {
    let mood = match accords.quadrant() {
        Some(quadrant) => quadrant.mood(),
        None if accords.quadrants().len() == 4 => "balanced",
        None => "layered",
    };
    let lead = |nc: NoteClass| {
        formula
            .partition(nc)
            .iter()
            .max_by(|a, b| {
                a.concentration_pct
                    .partial_cmp(&b.concentration_pct)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map_or("its neutral core", |e| e.name())
    };
    format!(
        "A {mood} {} composition opening on {}, with a heart of {} over {}. Tuned for {} skin at pH {:.1} and {:.1} °C.",
        accords.label(),
        lead(NoteClass::Top),
        lead(NoteClass::Middle),
        lead(NoteClass::Base),
        profile.skin_type(),
        profile.ph(),
        profile.temperature_c()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::embeddings::{Embedding, EmbeddingProvider};
    use crate::rag::{FallbackRetriever, SemanticRetriever};
    use crate::types::{FormulaEntry, SkinType, PARTITION_TOLERANCE_PCT};
    use crate::utilities::errors::EmbeddingError;
    use async_trait::async_trait;
    use std::time::Duration;

    struct SlowEmbedder;

    #[async_trait]
    impl EmbeddingProvider for SlowEmbedder {
        fn name(&self) -> &str {
            "slow"
        }

        async fn embed(&self, _text: &str) -> Result<Embedding, EmbeddingError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(vec![1.0])
        }
    }

    struct BrokenEmbedder;

    #[async_trait]
    impl EmbeddingProvider for BrokenEmbedder {
        fn name(&self) -> &str {
            "broken"
        }

        async fn embed(&self, _text: &str) -> Result<Embedding, EmbeddingError> {
            Err(EmbeddingError::InvalidResponse("offline".into()))
        }
    }

    fn engine(settings: Settings) -> FormulationEngine {
        FormulationEngine::from_settings(settings).unwrap()
    }

    fn dry_profile() -> BiochemicalProfile {
        BiochemicalProfile::new(5.5, SkinType::Dry, 36.5)
    }

    fn assert_balanced(formula: &Formula) {
        for nc in NoteClass::ALL {
            let sum = formula.composition.partition_sum(nc);
            assert!(
                (sum - nc.target_share_pct()).abs() <= PARTITION_TOLERANCE_PCT,
                "{nc} sums to {sum}"
            );
        }
    }

    #[tokio::test]
    async fn test_dry_skin_scenario_semantic() {
        let engine = engine(Settings::default());
        assert_eq!(engine.retrieval_mode(), RetrievalMode::Semantic);

        let output = engine
            .generate_formula_traced(&dry_profile(), &EmotionalTarget::new(0.3, 0.2))
            .await
            .unwrap();
        let diagnostics = &output.diagnostics;
        assert_eq!(diagnostics.accords_label, "Excited/Joyful");
        assert_eq!(diagnostics.retrieval_mode, RetrievalMode::Semantic);
        assert!(diagnostics.fallback_reason.is_none());
        assert_eq!(diagnostics.directives[0].rule_id, "dry-skin-fixative-boost");

        let formula = &output.formula;
        assert_eq!(formula.name, "Aether Signature");
        if output.compliance.truncated_pct.is_empty() {
            assert_balanced(formula);
        }
        assert!(formula
            .composition
            .corrections_applied
            .iter()
            .any(|c| c.contains("base fixative")));
        assert!(formula.description.contains("dry skin"));
        assert_eq!(formula.fingerprint.len(), 64);
        let m = formula.metrics;
        for value in [m.longevity, m.projection, m.uniqueness, m.sustainability, m.compliance_score] {
            assert!((0.0..=1.0).contains(&value));
        }
    }

    #[tokio::test]
    async fn test_dry_skin_scenario_keyword() {
        let engine = engine(Settings::default().with_retrieval_mode(RetrievalMode::Keyword));
        let output = engine
            .generate_formula_traced(&dry_profile(), &EmotionalTarget::new(0.3, 0.2))
            .await
            .unwrap();
        let first = &output.diagnostics.directives[0];
        assert_eq!(first.rule_id, "dry-skin-fixative-boost");
        let rule = engine.corpus().get(&first.rule_id).unwrap();
        assert_eq!(first.relevance_score, KeywordRetriever::score(rule, &dry_profile()));
    }

    #[tokio::test]
    async fn test_embedding_timeout_falls_back_to_keywords() {
        let base = engine(Settings::default());
        let corpus = Arc::new(base.corpus().clone());
        let options = RankingOptions::default();
        let semantic = SemanticRetriever::new(
            corpus.clone(),
            Arc::new(SlowEmbedder),
            options,
            Duration::from_millis(50),
        );
        let retriever = FallbackRetriever::new(semantic, KeywordRetriever::new(corpus, options));
        let engine = base.with_retriever(Arc::new(retriever));

        let profile = dry_profile();
        let output = engine
            .generate_formula_traced(&profile, &EmotionalTarget::new(0.3, 0.2))
            .await
            .unwrap();
        assert_eq!(output.diagnostics.retrieval_mode, RetrievalMode::Keyword);
        assert!(output.diagnostics.fallback_reason.is_some());
        for directive in &output.diagnostics.directives {
            let rule = engine.corpus().get(&directive.rule_id).unwrap();
            assert_eq!(directive.relevance_score, KeywordRetriever::score(rule, &profile));
            assert!((0.0..=1.0).contains(&directive.relevance_score));
        }
    }

    #[tokio::test]
    async fn test_engine_recovers_from_bare_semantic_failure() {
        let base = engine(Settings::default());
        let corpus = Arc::new(base.corpus().clone());
        let semantic = SemanticRetriever::new(
            corpus,
            Arc::new(BrokenEmbedder),
            RankingOptions::default(),
            Duration::from_secs(1),
        );
        let engine = base.with_retriever(Arc::new(semantic));
        let output = engine
            .generate_formula_traced(&dry_profile(), &EmotionalTarget::new(0.3, 0.2))
            .await
            .unwrap();
        assert_eq!(output.diagnostics.retrieval_mode, RetrievalMode::Keyword);
        assert!(output
            .diagnostics
            .fallback_reason
            .as_deref()
            .unwrap()
            .contains("offline"));
    }

    #[tokio::test]
    async fn test_identical_inputs_give_identical_compositions() {
        let engine = engine(Settings::default());
        let profile = BiochemicalProfile::new(6.4, SkinType::Oily, 37.5);
        let target = EmotionalTarget::new(-0.4, 0.7).with_prompt("something fresh");
        let (a, _) = engine.generate_formula(&profile, &target).await.unwrap();
        let (b, _) = engine.generate_formula(&profile, &target).await.unwrap();
        assert_eq!(a.name, "Morning Dew");
        assert_eq!(a.composition, b.composition);
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.formula_id, b.formula_id);
    }

    #[tokio::test]
    async fn test_validating_a_generated_formula_is_a_no_op() {
        let engine = engine(Settings::default());
        let (formula, result) = engine
            .generate_formula(&dry_profile(), &EmotionalTarget::new(0.6, -0.6))
            .await
            .unwrap();
        let (again, second) = engine.validate(&formula.composition);
        assert!(second
            .violations
            .iter()
            .all(|v| v.category == crate::formulation::ALLERGEN_AGGREGATE));
        if result.truncated_pct.is_empty() {
            assert_eq!(again, formula.composition);
            assert_eq!(
                second.valid,
                result.violation_for(crate::formulation::ALLERGEN_TOTAL).is_none()
            );
        }
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_the_engine() {
        let engine = Arc::new(engine(Settings::default()));
        let mut handles = Vec::new();
        for i in 0..8 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                let valence = -1.0 + i as f64 * 0.25;
                let profile = BiochemicalProfile::new(4.0 + i as f64 * 0.5, SkinType::Normal, 36.8);
                engine
                    .generate_formula(&profile, &EmotionalTarget::new(valence, 0.5))
                    .await
            }));
        }
        for handle in handles {
            let (formula, result) = handle.await.unwrap().unwrap();
            assert!(formula.ingredient_count() >= 3);
            assert!(result.passes <= engine.settings().compliance.max_passes);
        }
        assert!(engine.calculator().cached_len() > 0);
    }

    #[test]
    fn test_empty_corpus_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("physio_rules.yaml"), "rules: []\n").unwrap();
        let err = FormulationEngine::from_settings(Settings::default().with_data_dir(dir.path()))
            .err()
            .unwrap();
        assert!(matches!(err, FormulationError::CorpusEmpty));
    }

    #[test]
    fn test_formula_names() {
        assert_eq!(formula_name(Some("A FRESH start")), "Morning Dew");
        assert_eq!(formula_name(Some("cozy cabin")), "Golden Hour");
        assert_eq!(formula_name(Some("warm skin")), "Golden Hour");
        assert_eq!(formula_name(None), "Aether Signature");
    }

    #[test]
    fn test_fingerprint_tracks_rounded_composition() {
        let catalog = IngredientCatalog::builtin().unwrap();
        let mut draft = DraftFormula::new();
        draft.top.push(FormulaEntry::new(
            catalog.neutral(NoteClass::Top).clone(),
            20.0,
            None,
        ));
        let a = fingerprint(&draft);
        draft.top[0].concentration_pct = 20.000_000_1;
        assert_eq!(fingerprint(&draft), a);
        draft.top[0].concentration_pct = 19.5;
        assert_ne!(fingerprint(&draft), a);
    }
}
