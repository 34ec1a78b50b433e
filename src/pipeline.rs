//! The creation pipeline.
//!
//! [`Creator`] runs one operation per call and keeps no state between calls:
//!
//! ```text
//! validate ──▶ route ──┬──▶ AI path ──(any GenerationError)──┐
//!                      │   prompt → generate → [parse]       │
//!                      │                                     ▼
//!                      └────────────────────────────▶ fallback path
//!                                                            │
//!          (merge only) title: embedded → title call → deterministic
//! ```
//!
//! Only [`ValidationError`] escapes. Every generation failure is absorbed
//! into the fallback and reported through [`Branch::Fallback`], so callers
//! can tell which strategy produced the result without parsing logs.

use anyhow::Result;
use std::sync::Arc;

use crate::client::{build_client, GenerationClient};
use crate::config::Config;
use crate::error::{GenerationError, ValidationError};
use crate::fallback::{Clock, FallbackComposer, SystemClock};
use crate::models::{Branch, Created, FallbackReason, Material, Merged, MergedArticle, TitleSource};
use crate::parser::parse_merge_response;
use crate::prompt::PromptBuilder;
use crate::wire::GenerationRequest;

/// Orchestrates prompt building, generation, parsing and fallback.
#[derive(Clone)]
pub struct Creator {
    config: Config,
    client: Option<Arc<dyn GenerationClient>>,
    prompts: PromptBuilder,
    fallback: FallbackComposer,
}

impl Creator {
    /// Wires a creator with an explicit client and clock.
    ///
    /// `client = None` means no credential is available; every call takes
    /// the fallback path with [`FallbackReason::MissingCredential`].
    pub fn new(
        config: Config,
        client: Option<Arc<dyn GenerationClient>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let prompts = PromptBuilder::new(config.prompt.clone());
        let fallback = FallbackComposer::new(config.fallback.title_chars, clock);
        Self {
            config,
            client,
            prompts,
            fallback,
        }
    }

    /// Resolves the backend from configuration and uses the system clock.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = if config.generation.enabled {
            build_client(&config.generation)?
        } else {
            None
        };
        Ok(Self::new(config.clone(), client, Arc::new(SystemClock)))
    }

    pub fn fallback(&self) -> &FallbackComposer {
        &self.fallback
    }

    /// The client to use, or the reason there is none.
    fn route(&self) -> Result<&Arc<dyn GenerationClient>, FallbackReason> {
        if !self.config.generation.enabled {
            return Err(FallbackReason::AiDisabled);
        }
        self.client.as_ref().ok_or(FallbackReason::MissingCredential)
    }

    /// Create a new article from 2–3 materials.
    ///
    /// Slots 1 and 2 must be non-empty; slot 3 may be empty.
    pub async fn create_article(&self, slots: [&str; 3]) -> Result<Created, ValidationError> {
        let materials = validate_create(slots)?;

        let branch = match self.route() {
            Ok(client) => match self.ai_create(client.as_ref(), &materials).await {
                Ok(content) => {
                    log::info!(
                        "create: AI path via {} ({} chars)",
                        client.name(),
                        content.chars().count()
                    );
                    return Ok(Created {
                        content,
                        branch: Branch::Ai,
                    });
                }
                Err(e) => {
                    log::warn!("create: AI path failed ({}): {}; using fallback", e.kind(), e);
                    FallbackReason::Failed(e)
                }
            },
            Err(reason) => {
                log::info!("create: fallback path ({:?})", reason);
                reason
            }
        };

        Ok(Created {
            content: self.fallback.simple_create(&materials),
            branch: Branch::Fallback(branch),
        })
    }

    async fn ai_create(
        &self,
        client: &dyn GenerationClient,
        materials: &[Material],
    ) -> Result<String, GenerationError> {
        let request = GenerationRequest {
            prompt: self.prompts.build_creation_prompt(materials),
            system_instruction: Some(self.prompts.system_instruction().to_string()),
            options: self.config.generation.creative,
        };
        let text = client.generate(&request).await?;
        let content = text.trim();
        if content.is_empty() {
            return Err(GenerationError::MalformedResponse(
                "completion is blank".to_string(),
            ));
        }
        Ok(content.to_string())
    }

    /// Merge 2–3 articles into one segment-annotated article.
    ///
    /// Any two of the three slots may be filled. Segment sources refer to
    /// slot numbers.
    pub async fn merge_articles(&self, slots: [&str; 3]) -> Result<Merged, ValidationError> {
        let articles = validate_merge(slots)?;

        let (segments_article, embedded_title, branch) = match self.route() {
            Ok(client) => match self.ai_merge(client.as_ref(), &articles).await {
                Ok((article, title)) => {
                    log::info!(
                        "merge: AI path via {} ({} segments)",
                        client.name(),
                        article.segments().len()
                    );
                    (article, title, Branch::Ai)
                }
                Err(e) => {
                    log::warn!("merge: AI path failed ({}): {}; using fallback", e.kind(), e);
                    (
                        self.fallback.simple_merge(&articles),
                        None,
                        Branch::Fallback(FallbackReason::Failed(e)),
                    )
                }
            },
            Err(reason) => {
                log::info!("merge: fallback path ({:?})", reason);
                (
                    self.fallback.simple_merge(&articles),
                    None,
                    Branch::Fallback(reason),
                )
            }
        };

        let (title, title_source) = match embedded_title {
            Some(title) => (title, TitleSource::Embedded),
            None => self.resolve_title(segments_article.plain_text()).await,
        };

        Ok(Merged {
            article: segments_article.with_title(title),
            branch,
            title_source,
        })
    }

    async fn ai_merge(
        &self,
        client: &dyn GenerationClient,
        articles: &[Material],
    ) -> Result<(MergedArticle, Option<String>), GenerationError> {
        let request = GenerationRequest {
            prompt: self.prompts.build_merge_prompt(articles),
            system_instruction: Some(self.prompts.system_instruction().to_string()),
            options: self.config.generation.creative,
        };
        let raw = client.generate(&request).await?;
        let parsed = parse_merge_response(&raw)?;
        Ok((MergedArticle::new(parsed.segments, ""), parsed.title))
    }

    /// Dedicated title call, falling back to the deterministic title.
    ///
    /// Used by the merge flow when the structured block carried no title.
    pub async fn resolve_title(&self, content: &str) -> (String, TitleSource) {
        let client = match self.route() {
            Ok(client) => client,
            Err(_) => return (self.fallback.title(content), TitleSource::Fallback),
        };

        match self.ai_title(client.as_ref(), content).await {
            Ok(title) => (title, TitleSource::Generated),
            Err(e) => {
                log::warn!("title: generation failed ({}): {}; using fallback", e.kind(), e);
                (self.fallback.title(content), TitleSource::Fallback)
            }
        }
    }

    async fn ai_title(
        &self,
        client: &dyn GenerationClient,
        content: &str,
    ) -> Result<String, GenerationError> {
        let request = GenerationRequest {
            prompt: self
                .prompts
                .build_title_prompt(self.prompts.title_preview(content)),
            system_instruction: None,
            options: self.config.generation.title,
        };
        let raw = client.generate(&request).await?;
        clean_title(&raw, self.prompts.title_max_chars()).ok_or_else(|| {
            GenerationError::MalformedResponse("title completion is blank".to_string())
        })
    }
}

/// First non-blank line, without wrapping quotes or a `標題：` label,
/// capped at `max_chars`.
fn clean_title(raw: &str, max_chars: usize) -> Option<String> {
    const WRAPPERS: &[char] = &['"', '\'', '「', '」', '『', '』', '《', '》', '“', '”', '*', '#'];

    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line
        .strip_prefix("標題：")
        .or_else(|| line.strip_prefix("標題:"))
        .unwrap_or(line);
    let title: String = line
        .trim()
        .trim_matches(WRAPPERS)
        .trim()
        .chars()
        .take(max_chars)
        .collect();
    (!title.is_empty()).then_some(title)
}

fn material(slot: usize, text: &str) -> Option<Material> {
    let text = text.trim();
    (!text.is_empty()).then(|| Material {
        slot: slot as u8 + 1,
        text: text.to_string(),
    })
}

/// Create needs slots 1 and 2; slot 3 is optional.
pub fn validate_create(slots: [&str; 3]) -> Result<Vec<Material>, ValidationError> {
    let materials: Vec<Option<Material>> = slots
        .iter()
        .enumerate()
        .map(|(i, t)| material(i, t))
        .collect();

    for (i, m) in materials.iter().take(2).enumerate() {
        if m.is_none() {
            return Err(ValidationError::MissingMaterial(i as u8 + 1));
        }
    }

    Ok(materials.into_iter().flatten().collect())
}

/// Merge needs any two of the three slots.
pub fn validate_merge(slots: [&str; 3]) -> Result<Vec<Material>, ValidationError> {
    let articles: Vec<Material> = slots
        .iter()
        .enumerate()
        .filter_map(|(i, t)| material(i, t))
        .collect();

    if articles.len() < 2 {
        return Err(ValidationError::NotEnoughArticles(articles.len()));
    }
    Ok(articles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::FixedClock;
    use crate::models::{Segment, SegmentKind};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    /// Replays canned completions and records the prompts it saw.
    struct Scripted {
        replies: Mutex<Vec<Result<String, GenerationError>>>,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, GenerationError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl GenerationClient for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
            self.seen.lock().unwrap().push(request.clone());
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                return Err(GenerationError::Transport("no scripted reply".into()));
            }
            replies.remove(0)
        }
    }

    fn clock() -> Arc<dyn Clock> {
        Arc::new(FixedClock(
            NaiveDate::from_ymd_opt(2026, 1, 2)
                .unwrap()
                .and_hms_opt(3, 4, 0)
                .unwrap(),
        ))
    }

    fn creator(client: Option<Arc<dyn GenerationClient>>) -> Creator {
        Creator::new(Config::minimal(), client, clock())
    }

    fn remote_500() -> GenerationError {
        GenerationError::Remote {
            status: 500,
            details: serde_json::json!({}),
        }
    }

    #[test]
    fn create_requires_first_two_slots() {
        assert_eq!(
            validate_create(["", "b", "c"]).unwrap_err(),
            ValidationError::MissingMaterial(1)
        );
        assert_eq!(
            validate_create(["a", "  \n", "c"]).unwrap_err(),
            ValidationError::MissingMaterial(2)
        );
        assert_eq!(validate_create(["a", "b", " "]).unwrap().len(), 2);
    }

    #[test]
    fn merge_accepts_any_two_slots() {
        let articles = validate_merge(["a", "", "c"]).unwrap();
        assert_eq!(articles.iter().map(|a| a.slot).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(
            validate_merge(["", "", "c"]).unwrap_err(),
            ValidationError::NotEnoughArticles(1)
        );
    }

    #[tokio::test]
    async fn validation_error_never_calls_backend() {
        let client = Scripted::new(vec![Ok("unused".into())]);
        let creator = creator(Some(client.clone()));
        assert!(creator.create_article(["", "b", ""]).await.is_err());
        assert!(creator.merge_articles(["a", "", ""]).await.is_err());
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn no_client_means_missing_credential() {
        let created = creator(None)
            .create_article(["A material one.", "B material two.", ""])
            .await
            .unwrap();
        assert_eq!(created.content, "A material one.\n\nB material two.");
        assert_eq!(
            created.branch,
            Branch::Fallback(FallbackReason::MissingCredential)
        );
    }

    #[tokio::test]
    async fn disabled_ai_skips_client() {
        let client = Scripted::new(vec![Ok("ai text".into())]);
        let mut config = Config::minimal();
        config.generation.enabled = false;
        let creator = Creator::new(config, Some(client.clone()), clock());

        let created = creator.create_article(["a", "b", ""]).await.unwrap();
        assert_eq!(created.branch, Branch::Fallback(FallbackReason::AiDisabled));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn create_ai_path_trims_completion() {
        let client = Scripted::new(vec![Ok("\n  全新的文章。 \n".into())]);
        let created = creator(Some(client.clone()))
            .create_article(["a", "b", "c"])
            .await
            .unwrap();
        assert_eq!(created.content, "全新的文章。");
        assert!(created.branch.is_ai());

        let seen = client.seen.lock().unwrap();
        assert!(seen[0].prompt.contains("參考素材三：\nc"));
        assert_eq!(seen[0].options.temperature, 0.8);
    }

    #[tokio::test]
    async fn create_failure_degrades_to_join() {
        let client = Scripted::new(vec![Err(remote_500())]);
        let created = creator(Some(client))
            .create_article(["a", "b", ""])
            .await
            .unwrap();
        assert_eq!(created.content, "a\n\nb");
        assert_eq!(
            created.branch,
            Branch::Fallback(FallbackReason::Failed(remote_500()))
        );
    }

    #[tokio::test]
    async fn merge_embedded_title_wins() {
        let reply = "好的：\n```json\n{\"title\":\"嵌入標題\",\"segments\":[{\"text\":\"甲\",\"type\":\"modified\",\"source\":1},{\"text\":\"橋\",\"type\":\"generated\"},{\"text\":\"乙\",\"type\":\"modified\",\"source\":2}]}\n```";
        let client = Scripted::new(vec![Ok(reply.into())]);
        let merged = creator(Some(client.clone()))
            .merge_articles(["甲文", "乙文", ""])
            .await
            .unwrap();

        assert_eq!(merged.article.title(), "嵌入標題");
        assert_eq!(merged.title_source, TitleSource::Embedded);
        assert_eq!(merged.article.plain_text(), "甲橋乙");
        assert!(merged.branch.is_ai());
        // No separate title call.
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn merge_without_title_asks_for_one() {
        let reply = "```json\n{\"segments\":[{\"text\":\"甲\",\"type\":\"modified\",\"source\":1}]}\n```";
        let client = Scripted::new(vec![Ok(reply.into()), Ok("「春日散步」\n".into())]);
        let merged = creator(Some(client.clone()))
            .merge_articles(["a", "b", ""])
            .await
            .unwrap();

        assert_eq!(merged.article.title(), "春日散步");
        assert_eq!(merged.title_source, TitleSource::Generated);

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].options.max_output_tokens, 64);
        assert!(seen[1].prompt.contains("甲"));
    }

    #[tokio::test]
    async fn merge_parse_failure_degrades_completely() {
        let client = Scripted::new(vec![Ok("no block here".into()), Err(remote_500())]);
        let merged = creator(Some(client))
            .merge_articles(["X", "Y", "Z"])
            .await
            .unwrap();
        let expected = creator(None).merge_articles(["X", "Y", "Z"]).await.unwrap();

        assert_eq!(merged.article, expected.article);
        assert_eq!(merged.title_source, TitleSource::Fallback);
        assert!(matches!(
            merged.branch,
            Branch::Fallback(FallbackReason::Failed(GenerationError::Parse(_)))
        ));
    }

    #[tokio::test]
    async fn merge_fallback_keeps_segment_shape() {
        let merged = creator(None).merge_articles(["X", "Y", "Z"]).await.unwrap();
        let kinds: Vec<_> = merged
            .article
            .segments()
            .iter()
            .map(|s| s.kind.clone())
            .collect();
        assert_eq!(
            kinds,
            vec![
                SegmentKind::Original,
                SegmentKind::Generated,
                SegmentKind::Original,
                SegmentKind::Generated,
                SegmentKind::Original,
            ]
        );
        assert_eq!(merged.article.segments()[4], Segment::original("Z", 3));
        assert_eq!(merged.article.title(), "XYZ 2026-01-02 03:04");
    }

    #[tokio::test]
    async fn title_failure_keeps_ai_segments() {
        let reply = "```json\n{\"segments\":[{\"text\":\"內容很長的段落\",\"type\":\"generated\"}]}\n```";
        let client = Scripted::new(vec![Ok(reply.into()), Ok("   \n".into())]);
        let merged = creator(Some(client))
            .merge_articles(["a", "b", ""])
            .await
            .unwrap();
        assert!(merged.branch.is_ai());
        assert_eq!(merged.title_source, TitleSource::Fallback);
        assert_eq!(merged.article.title(), "內容很長的 2026-01-02 03:04");
    }

    #[test]
    fn clean_title_strips_labels_and_caps_length() {
        assert_eq!(clean_title("標題：《夜行》", 15).as_deref(), Some("夜行"));
        assert_eq!(clean_title("\n\n\"Hello\"\nextra", 15).as_deref(), Some("Hello"));
        assert_eq!(clean_title("一二三四五六", 3).as_deref(), Some("一二三"));
        assert_eq!(clean_title("「」", 3), None);
    }
}
