//! Destination for decoded records.
//!
//! The pipeline only talks to [`DataStore`]; [`MemoryStore`] is the bundled
//! implementation, exported as JSON by the command line tool.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::debug;
use pdd_formats::{DecodedImage, ImageContainer};
use serde::Serialize;
use thiserror::Error;

pub type RecordId = u32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("write outside a transaction")]
    NoTransaction,
    #[error("a transaction is already open")]
    TransactionOpen,
    #[error("duplicate {kind} '{key}'")]
    Duplicate { kind: &'static str, key: String },
    #[error("unknown {kind} id {id}")]
    UnknownId { kind: &'static str, id: RecordId },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Question row as handed to the store, references already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuestion<'a> {
    pub topic_id: RecordId,
    pub text: &'a str,
    pub image_id: Option<RecordId>,
    pub advice: Option<&'a str>,
    pub comment_id: Option<RecordId>,
}

pub trait DataStore {
    fn begin(&mut self) -> StoreResult<()>;
    fn commit(&mut self) -> StoreResult<()>;
    fn rollback(&mut self) -> StoreResult<()>;

    fn insert_image(&mut self, image: &DecodedImage) -> StoreResult<RecordId>;
    fn insert_comment(&mut self, number: i32, text: &str) -> StoreResult<RecordId>;
    fn insert_traffreg(&mut self, number: i32, text: &str) -> StoreResult<RecordId>;
    fn insert_section(&mut self, name: &str) -> StoreResult<RecordId>;
    fn insert_topic(
        &mut self,
        number: i8,
        questions_per_ticket: Option<u32>,
    ) -> StoreResult<RecordId>;
    fn insert_question(&mut self, question: &NewQuestion<'_>) -> StoreResult<RecordId>;
    fn insert_answer(
        &mut self,
        question_id: RecordId,
        position: usize,
        text: &str,
        is_correct: bool,
    ) -> StoreResult<RecordId>;

    fn link_image_traffreg(
        &mut self,
        image_id: RecordId,
        traffreg_id: RecordId,
    ) -> StoreResult<()>;
    fn link_question_section(
        &mut self,
        question_id: RecordId,
        section_id: RecordId,
    ) -> StoreResult<()>;
    fn link_question_traffreg(
        &mut self,
        question_id: RecordId,
        traffreg_id: RecordId,
    ) -> StoreResult<()>;

    fn find_image(&self, name: &str) -> Option<RecordId>;
    fn find_section(&self, name: &str) -> Option<RecordId>;
    fn find_comment(&self, number: i32) -> Option<RecordId>;
    fn find_traffreg(&self, number: i32) -> Option<RecordId>;
}

#[derive(Debug, Clone, Serialize)]
pub struct Topic {
    pub id: RecordId,
    pub number: i8,
    pub questions_per_ticket: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Section {
    pub id: RecordId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Question {
    pub id: RecordId,
    pub topic_id: RecordId,
    pub text: String,
    pub image_id: Option<RecordId>,
    pub advice: Option<String>,
    pub comment_id: Option<RecordId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub id: RecordId,
    pub question_id: RecordId,
    pub position: usize,
    pub text: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Comment {
    pub id: RecordId,
    pub number: i32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrafficRegulation {
    pub id: RecordId,
    pub number: i32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Image {
    pub id: RecordId,
    pub name: String,
    pub container: ImageContainer,
    pub size: usize,
    #[serde(skip)]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Tables {
    pub topics: Vec<Topic>,
    pub sections: Vec<Section>,
    pub questions: Vec<Question>,
    pub answers: Vec<Answer>,
    pub comments: Vec<Comment>,
    pub traffregs: Vec<TrafficRegulation>,
    pub images: Vec<Image>,
    pub question_sections: Vec<(RecordId, RecordId)>,
    pub question_traffregs: Vec<(RecordId, RecordId)>,
    pub image_traffregs: Vec<(RecordId, RecordId)>,
    #[serde(skip)]
    index: Indexes,
}

#[derive(Debug, Clone, Default)]
struct Indexes {
    images: BTreeMap<String, RecordId>,
    sections: BTreeMap<String, RecordId>,
    comments: BTreeMap<i32, RecordId>,
    traffregs: BTreeMap<i32, RecordId>,
    topics: BTreeMap<i8, RecordId>,
}

/// Row counts taken at `begin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Checkpoint {
    topics: usize,
    sections: usize,
    questions: usize,
    answers: usize,
    comments: usize,
    traffregs: usize,
    images: usize,
    question_sections: usize,
    question_traffregs: usize,
    image_traffregs: usize,
}

impl Tables {
    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            topics: self.topics.len(),
            sections: self.sections.len(),
            questions: self.questions.len(),
            answers: self.answers.len(),
            comments: self.comments.len(),
            traffregs: self.traffregs.len(),
            images: self.images.len(),
            question_sections: self.question_sections.len(),
            question_traffregs: self.question_traffregs.len(),
            image_traffregs: self.image_traffregs.len(),
        }
    }

    // Ids are dense per table, so every row added since the checkpoint has an
    // id above the recorded count.
    fn restore(&mut self, at: &Checkpoint) {
        self.topics.truncate(at.topics);
        self.sections.truncate(at.sections);
        self.questions.truncate(at.questions);
        self.answers.truncate(at.answers);
        self.comments.truncate(at.comments);
        self.traffregs.truncate(at.traffregs);
        self.images.truncate(at.images);
        self.question_sections.truncate(at.question_sections);
        self.question_traffregs.truncate(at.question_traffregs);
        self.image_traffregs.truncate(at.image_traffregs);

        retain_ids(&mut self.index.topics, at.topics);
        retain_ids(&mut self.index.sections, at.sections);
        retain_ids(&mut self.index.comments, at.comments);
        retain_ids(&mut self.index.traffregs, at.traffregs);
        retain_ids(&mut self.index.images, at.images);
    }
}

fn retain_ids<K: Ord>(index: &mut BTreeMap<K, RecordId>, count: usize) {
    index.retain(|_, id| (*id as usize) <= count);
}

/// In-memory store. Rollback truncates every table back to its length at
/// `begin`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Tables,
    checkpoint: Option<Checkpoint>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    pub fn in_transaction(&self) -> bool {
        self.checkpoint.is_some()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.tables)
    }

    /// Writes every image payload to `dir` as `<name>.bmp`.
    pub fn export_images(&self, dir: &Path) -> std::io::Result<usize> {
        fs::create_dir_all(dir)?;
        for image in &self.tables.images {
            fs::write(dir.join(format!("{}.bmp", image.name)), &image.data)?;
        }
        Ok(self.tables.images.len())
    }

    fn writable(&mut self) -> StoreResult<&mut Tables> {
        if self.checkpoint.is_none() {
            return Err(StoreError::NoTransaction);
        }
        Ok(&mut self.tables)
    }
}

fn next_id(len: usize) -> RecordId {
    len as RecordId + 1
}

fn claim<K: Ord>(
    index: &mut BTreeMap<K, RecordId>,
    key: K,
    id: RecordId,
    kind: &'static str,
    display: impl FnOnce() -> String,
) -> StoreResult<()> {
    if index.contains_key(&key) {
        return Err(StoreError::Duplicate {
            kind,
            key: display(),
        });
    }
    index.insert(key, id);
    Ok(())
}

fn ensure_id(count: usize, id: RecordId, kind: &'static str) -> StoreResult<()> {
    if id == 0 || id as usize > count {
        return Err(StoreError::UnknownId { kind, id });
    }
    Ok(())
}

impl DataStore for MemoryStore {
    fn begin(&mut self) -> StoreResult<()> {
        if self.checkpoint.is_some() {
            return Err(StoreError::TransactionOpen);
        }
        self.checkpoint = Some(self.tables.checkpoint());
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.checkpoint.take().ok_or(StoreError::NoTransaction)?;
        Ok(())
    }

    fn rollback(&mut self) -> StoreResult<()> {
        let checkpoint = self.checkpoint.take().ok_or(StoreError::NoTransaction)?;
        debug!("truncating store to {checkpoint:?}");
        self.tables.restore(&checkpoint);
        Ok(())
    }

    fn insert_image(&mut self, image: &DecodedImage) -> StoreResult<RecordId> {
        let tables = self.writable()?;
        let id = next_id(tables.images.len());
        let key = image.name.to_lowercase();
        claim(&mut tables.index.images, key, id, "image", || image.name.clone())?;
        tables.images.push(Image {
            id,
            name: image.name.clone(),
            container: image.container,
            size: image.data.len(),
            data: image.data.clone(),
        });
        Ok(id)
    }

    fn insert_comment(&mut self, number: i32, text: &str) -> StoreResult<RecordId> {
        let tables = self.writable()?;
        let id = next_id(tables.comments.len());
        claim(&mut tables.index.comments, number, id, "comment", || {
            number.to_string()
        })?;
        tables.comments.push(Comment {
            id,
            number,
            text: text.to_string(),
        });
        Ok(id)
    }

    fn insert_traffreg(&mut self, number: i32, text: &str) -> StoreResult<RecordId> {
        let tables = self.writable()?;
        let id = next_id(tables.traffregs.len());
        claim(&mut tables.index.traffregs, number, id, "traffic regulation", || {
            number.to_string()
        })?;
        tables.traffregs.push(TrafficRegulation {
            id,
            number,
            text: text.to_string(),
        });
        Ok(id)
    }

    fn insert_section(&mut self, name: &str) -> StoreResult<RecordId> {
        let tables = self.writable()?;
        let id = next_id(tables.sections.len());
        claim(&mut tables.index.sections, name.to_lowercase(), id, "section", || {
            name.to_string()
        })?;
        tables.sections.push(Section {
            id,
            name: name.to_string(),
        });
        Ok(id)
    }

    fn insert_topic(
        &mut self,
        number: i8,
        questions_per_ticket: Option<u32>,
    ) -> StoreResult<RecordId> {
        let tables = self.writable()?;
        let id = next_id(tables.topics.len());
        claim(&mut tables.index.topics, number, id, "topic", || number.to_string())?;
        tables.topics.push(Topic {
            id,
            number,
            questions_per_ticket,
        });
        Ok(id)
    }

    fn insert_question(&mut self, question: &NewQuestion<'_>) -> StoreResult<RecordId> {
        let tables = self.writable()?;
        ensure_id(tables.topics.len(), question.topic_id, "topic")?;
        if let Some(image_id) = question.image_id {
            ensure_id(tables.images.len(), image_id, "image")?;
        }
        if let Some(comment_id) = question.comment_id {
            ensure_id(tables.comments.len(), comment_id, "comment")?;
        }
        let id = next_id(tables.questions.len());
        tables.questions.push(Question {
            id,
            topic_id: question.topic_id,
            text: question.text.to_string(),
            image_id: question.image_id,
            advice: question.advice.map(str::to_string),
            comment_id: question.comment_id,
        });
        Ok(id)
    }

    fn insert_answer(
        &mut self,
        question_id: RecordId,
        position: usize,
        text: &str,
        is_correct: bool,
    ) -> StoreResult<RecordId> {
        let tables = self.writable()?;
        ensure_id(tables.questions.len(), question_id, "question")?;
        let id = next_id(tables.answers.len());
        tables.answers.push(Answer {
            id,
            question_id,
            position,
            text: text.to_string(),
            is_correct,
        });
        Ok(id)
    }

    fn link_image_traffreg(
        &mut self,
        image_id: RecordId,
        traffreg_id: RecordId,
    ) -> StoreResult<()> {
        let tables = self.writable()?;
        ensure_id(tables.images.len(), image_id, "image")?;
        ensure_id(tables.traffregs.len(), traffreg_id, "traffic regulation")?;
        tables.image_traffregs.push((image_id, traffreg_id));
        Ok(())
    }

    fn link_question_section(
        &mut self,
        question_id: RecordId,
        section_id: RecordId,
    ) -> StoreResult<()> {
        let tables = self.writable()?;
        ensure_id(tables.questions.len(), question_id, "question")?;
        ensure_id(tables.sections.len(), section_id, "section")?;
        tables.question_sections.push((question_id, section_id));
        Ok(())
    }

    fn link_question_traffreg(
        &mut self,
        question_id: RecordId,
        traffreg_id: RecordId,
    ) -> StoreResult<()> {
        let tables = self.writable()?;
        ensure_id(tables.questions.len(), question_id, "question")?;
        ensure_id(tables.traffregs.len(), traffreg_id, "traffic regulation")?;
        tables.question_traffregs.push((question_id, traffreg_id));
        Ok(())
    }

    fn find_image(&self, name: &str) -> Option<RecordId> {
        self.tables.index.images.get(&name.to_lowercase()).copied()
    }

    fn find_section(&self, name: &str) -> Option<RecordId> {
        self.tables.index.sections.get(&name.to_lowercase()).copied()
    }

    fn find_comment(&self, number: i32) -> Option<RecordId> {
        self.tables.index.comments.get(&number).copied()
    }

    fn find_traffreg(&self, number: i32) -> Option<RecordId> {
        self.tables.index.traffregs.get(&number).copied()
    }
}
