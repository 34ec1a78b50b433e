//! Instruction payloads for the generation backend.
//!
//! Pure string rendering: no I/O and no failure modes. Callers validate
//! material counts before building a prompt.

use crate::config::PromptConfig;
use crate::models::Material;

const NUMERALS: [&str; 3] = ["一", "二", "三"];

const SYSTEM_INSTRUCTION: &str =
    "你是一位專業的繁體中文文章創作者和編輯，擅長重組素材、潤飾文字並補充細節。";

/// Renders the create, merge and title prompts from a [`PromptConfig`].
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    config: PromptConfig,
}

impl PromptBuilder {
    pub fn new(config: PromptConfig) -> Self {
        Self { config }
    }

    /// Persona sent as `systemInstruction` alongside every prompt.
    pub fn system_instruction(&self) -> &'static str {
        SYSTEM_INSTRUCTION
    }

    /// Prompt for free-form article creation from 2–3 materials.
    pub fn build_creation_prompt(&self, materials: &[Material]) -> String {
        let target = self.config.target_length;
        let sources = labeled_sections("參考素材", materials);

        format!(
            "我會提供 {count} 段參考素材，請你以這些素材為基礎，創作一篇全新的文章。

**核心要求：文章必須達到 {target} 字**

**核心任務**：

1. **自由重組內容**：
   - 你可以自由決定使用哪些素材的哪些部分
   - 順序不必按照素材編號，可以先用後面的素材，再用前面的

2. **改寫與刪減**：
   - 大幅改寫素材內容，使其更流暢、更有邏輯
   - 刪除重複或不必要的內容，合併相似的觀點
   - 調整語氣和風格，使其統一

3. **補充與擴展**：
   - 文章總字數必須達到 {target} 字（硬性要求）
   - 讀起來應該像是原創作品，而非單純的素材拼接

**文字處理要求**：

4. **簡體轉繁體**：將所有簡體字轉換為繁體字（100% 轉換）

5. **標點符號統一**：
   - 必須使用全形標點：，。！？；：「」『』（）
   - 絕對不要使用半形標點

6. **分段與排版**：
   - 段落之間空一行

---

{sources}

---

現在請開始創作，直接輸出完整的 {target} 字新文章：",
            count = materials.len(),
        )
    }

    /// Prompt for merging 2–3 articles into one annotated article.
    ///
    /// The model must answer with a JSON block of the shape
    /// `{"title": ..., "segments": [{"text", "type", "source"?}]}`.
    pub fn build_merge_prompt(&self, articles: &[Material]) -> String {
        let PromptConfig {
            bridge_min,
            bridge_max,
            ..
        } = self.config;
        let title_max = self.config.title_max_chars;
        let sources = labeled_sections("文章", articles);

        format!(
            "我會提供 {count} 篇文章，請把它們融合成一篇連貫的長文，並標註每一段文字的來源。

**融合規則**：

1. 保留各篇文章的主要內容，可以改寫使語氣一致
2. 在每一個段落銜接處，補充 {bridge_min} 到 {bridge_max} 字的過渡內容，讓文章自然延伸
3. 將所有簡體字轉換為繁體字（100% 轉換）
4. 必須使用全形標點：，。！？；：「」『』（）
5. 段落之間空一行

**標註規則**：

- 來自原文但經過改寫的文字：type 為 \"modified\"，並以 source 標明來源文章編號（1 起算）
- 新補充的過渡或延伸內容：type 為 \"generated\"，不需要 source
- 段落之間的空行也要放進 segments，作為 type 為 \"generated\" 的片段
- 所有 segments 的 text 依序串接起來，必須就是完整的文章

**輸出格式**：

請只輸出一個 JSON 區塊，可以放在 ```json 與 ``` 之間，區塊前後可以有其他說明文字，但 JSON 本身必須完整且合法：

```json
{{
  \"title\": \"不超過 {title_max} 字的標題\",
  \"segments\": [
    {{ \"text\": \"改寫後的原文片段\", \"type\": \"modified\", \"source\": 1 }},
    {{ \"text\": \"新補充的過渡內容\", \"type\": \"generated\" }}
  ]
}}
```

---

{sources}

---

現在請開始融合，輸出 JSON：",
            count = articles.len(),
        )
    }

    /// Prompt asking for a short title only.
    pub fn build_title_prompt(&self, text_preview: &str) -> String {
        let title_max = self.config.title_max_chars;
        format!(
            "請為以下文章擬一個不超過 {title_max} 字的繁體中文標題。
只輸出標題本身，不要加引號、書名號、編號或任何說明文字。

---

{text_preview}

---

標題："
        )
    }

    /// Leading excerpt of `text` used as the title prompt's input.
    pub fn title_preview<'a>(&self, text: &'a str) -> &'a str {
        match text.char_indices().nth(self.config.title_preview_chars) {
            Some((idx, _)) => &text[..idx],
            None => text,
        }
    }

    /// Character bound the title prompt asks for.
    pub fn title_max_chars(&self) -> usize {
        self.config.title_max_chars
    }
}

/// `{label}一：\n...` sections for the present materials only.
fn labeled_sections(label: &str, materials: &[Material]) -> String {
    materials
        .iter()
        .map(|m| {
            let numeral = NUMERALS
                .get(usize::from(m.slot).saturating_sub(1))
                .copied()
                .unwrap_or("？");
            format!("{}{}：\n{}", label, numeral, m.text)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material(slot: u8, text: &str) -> Material {
        Material {
            slot,
            text: text.to_string(),
        }
    }

    fn builder() -> PromptBuilder {
        PromptBuilder::new(PromptConfig::default())
    }

    #[test]
    fn creation_prompt_embeds_materials_and_directives() {
        let prompt = builder().build_creation_prompt(&[
            material(1, "第一段素材"),
            material(2, "第二段素材"),
        ]);
        assert!(prompt.contains("參考素材一：\n第一段素材"));
        assert!(prompt.contains("參考素材二：\n第二段素材"));
        assert!(prompt.contains("10000 字"));
        assert!(prompt.contains("簡體轉繁體"));
        assert!(prompt.contains("全形標點"));
        assert!(prompt.contains("段落之間空一行"));
    }

    #[test]
    fn creation_prompt_omits_absent_third_material() {
        let two = builder().build_creation_prompt(&[material(1, "a"), material(2, "b")]);
        assert!(!two.contains("參考素材三"));

        let three = builder().build_creation_prompt(&[
            material(1, "a"),
            material(2, "b"),
            material(3, "c"),
        ]);
        assert!(three.contains("參考素材三：\nc"));
    }

    #[test]
    fn target_length_is_configurable() {
        let config = PromptConfig {
            target_length: 2500,
            ..PromptConfig::default()
        };
        let prompt = PromptBuilder::new(config).build_creation_prompt(&[material(1, "a"), material(2, "b")]);
        assert!(prompt.contains("2500 字"));
        assert!(!prompt.contains("10000"));
    }

    #[test]
    fn merge_prompt_documents_block_shape() {
        let prompt = builder().build_merge_prompt(&[material(1, "甲"), material(3, "丙")]);
        assert!(prompt.contains("文章一：\n甲"));
        assert!(prompt.contains("文章三：\n丙"));
        assert!(!prompt.contains("文章二："));
        assert!(prompt.contains("```json"));
        assert!(prompt.contains("\"segments\""));
        assert!(prompt.contains("\"modified\""));
        assert!(prompt.contains("\"generated\""));
        assert!(prompt.contains("300 到 800 字"));
    }

    #[test]
    fn title_prompt_asks_for_title_only() {
        let prompt = builder().build_title_prompt("一段文字");
        assert!(prompt.contains("不超過 15 字"));
        assert!(prompt.contains("只輸出標題本身"));
        assert!(prompt.contains("一段文字"));
    }

    #[test]
    fn title_preview_counts_chars_not_bytes() {
        let config = PromptConfig {
            title_preview_chars: 3,
            ..PromptConfig::default()
        };
        let builder = PromptBuilder::new(config);
        assert_eq!(builder.title_preview("繁體中文字"), "繁體中");
        assert_eq!(builder.title_preview("ab"), "ab");
    }
}
