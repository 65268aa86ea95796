//! Shared fakes for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::collections::VecDeque;
use std::sync::Mutex;

use syllabus::chat::{ChatError, ChatModel, ChatPrompt};
use syllabus::config::{parse_config, Config};
use syllabus::embedding::{EmbedError, EmbedIntent, EmbeddingProvider};
use syllabus::models::DocumentPage;
use syllabus::router::Engine;

pub const DIMS: usize = 256;

/// Deterministic bag-of-words embedder: each lower-cased word is hashed
/// into one of `DIMS` buckets and the counts are L2-normalized.
pub struct BagOfWords {
    pub model: String,
    pub calls: Mutex<Vec<(EmbedIntent, usize)>>,
    /// Errors returned (in order) before calls start succeeding.
    pub failures: Mutex<VecDeque<EmbedError>>,
}

impl BagOfWords {
    pub fn new() -> Self {
        Self::named("bag-of-words")
    }

    pub fn named(model: &str) -> Self {
        Self {
            model: model.to_string(),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
        }
    }

    pub fn failing_with(errors: Vec<EmbedError>) -> Self {
        let provider = Self::new();
        *provider.failures.lock().unwrap() = errors.into();
        provider
    }

    pub fn query_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(intent, _)| *intent == EmbedIntent::Query)
            .count()
    }
}

fn bucket(word: &str) -> usize {
    // FNV-1a
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in word.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % DIMS as u64) as usize
}

pub fn embed_text(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        v[bucket(&word.to_lowercase())] += 1.0;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

#[async_trait]
impl EmbeddingProvider for BagOfWords {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(
        &self,
        texts: &[String],
        intent: EmbedIntent,
    ) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.calls.lock().unwrap().push((intent, texts.len()));
        if let Some(err) = self.failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        Ok(texts.iter().map(|t| embed_text(t)).collect())
    }
}

/// Chat model that answers by citing the documents named in its context
/// and records every request it receives.
pub struct ScriptedChat {
    pub requests: Mutex<Vec<(Engine, ChatPrompt)>>,
    pub fail_vision: bool,
    pub fail_text: bool,
}

impl ScriptedChat {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            fail_vision: false,
            fail_text: false,
        }
    }

    pub fn requests(&self) -> Vec<(Engine, ChatPrompt)> {
        self.requests.lock().unwrap().clone()
    }
}

fn cited_documents(system: &str) -> Vec<String> {
    system
        .split("--- FROM DOCUMENT: ")
        .skip(1)
        .filter_map(|rest| rest.split(" ---").next())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl ChatModel for ScriptedChat {
    fn model_for(&self, engine: Engine) -> &str {
        match engine {
            Engine::Text => "scripted-text",
            Engine::Vision => "scripted-vision",
        }
    }

    async fn complete(&self, engine: Engine, prompt: &ChatPrompt) -> Result<String, ChatError> {
        self.requests
            .lock()
            .unwrap()
            .push((engine, prompt.clone()));

        let fail = match engine {
            Engine::Vision => self.fail_vision,
            Engine::Text => self.fail_text,
        };
        if fail {
            return Err(ChatError::Status {
                status: 503,
                message: "over capacity".to_string(),
            });
        }

        let docs = cited_documents(&prompt.system);
        if docs.is_empty() {
            Ok(format!("General answer to: {}", prompt.user))
        } else {
            Ok(format!(
                "Answer to: {} (Source: {})",
                prompt.user,
                docs.join(", ")
            ))
        }
    }
}

pub fn test_config() -> Config {
    parse_config(
        r#"
[index]
path = "./unused/index.sqlite"

[documents]
root = "./unused/docs"
"#,
    )
    .unwrap()
}

pub fn page(source: &str, page: u32, text: &str) -> DocumentPage {
    DocumentPage {
        source: source.to_string(),
        path: format!("materials/{}", source),
        page,
        text: text.to_string(),
    }
}

/// Encode a small RGBA PNG.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 120, 200, 255]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

/// Build a PDF with one page per entry, each page showing its text in
/// Helvetica. An empty entry produces a page with no text layer.
pub fn pdf_bytes(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let mut operations = Vec::new();
        if !text.is_empty() {
            operations = vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ];
        }
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}
