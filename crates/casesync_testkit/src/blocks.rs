//! Builders for case blocks and forms.
//!
//! Blocks are produced in the parsed-document shape the server consumes:
//! attributes under `@` keys, element text under `#text`.

use casesync_core::Form;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Map, Value};

/// Domain used by forms built here.
pub const TEST_DOMAIN: &str = "test";

/// Builds one case block.
#[derive(Debug, Clone)]
pub struct CaseBlock {
    id: String,
    date_modified: Option<String>,
    user_id: Option<String>,
    create: Option<Map<String, Value>>,
    update: Map<String, Value>,
    close: bool,
    index: Map<String, Value>,
}

impl CaseBlock {
    /// Starts a block for a case.
    pub fn new(case_id: impl Into<String>) -> Self {
        Self {
            id: case_id.into(),
            date_modified: None,
            user_id: None,
            create: None,
            update: Map::new(),
            close: false,
            index: Map::new(),
        }
    }

    /// Adds a create action.
    pub fn create(mut self, case_type: &str, case_name: &str) -> Self {
        let mut create = self.create.take().unwrap_or_default();
        create.insert("case_type".into(), json!(case_type));
        create.insert("case_name".into(), json!(case_name));
        self.create = Some(create);
        self
    }

    /// Sets the owner in the create action.
    pub fn owner(mut self, owner_id: &str) -> Self {
        let mut create = self.create.take().unwrap_or_default();
        create.insert("owner_id".into(), json!(owner_id));
        self.create = Some(create);
        self
    }

    /// Sets the external id in the create action.
    pub fn external_id(mut self, external_id: &str) -> Self {
        let mut create = self.create.take().unwrap_or_default();
        create.insert("external_id".into(), json!(external_id));
        self.create = Some(create);
        self
    }

    /// Adds a field to the update action.
    pub fn update(mut self, key: &str, value: &str) -> Self {
        self.update.insert(key.into(), json!(value));
        self
    }

    /// Adds a close action.
    pub fn close(mut self) -> Self {
        self.close = true;
        self
    }

    /// Adds an index. An empty `referenced_id` removes the index.
    pub fn index(mut self, identifier: &str, case_type: &str, referenced_id: &str) -> Self {
        self.index.insert(
            identifier.into(),
            json!({"@case_type": case_type, "#text": referenced_id}),
        );
        self
    }

    /// Sets the block's modification date.
    pub fn date_modified(mut self, date: &str) -> Self {
        self.date_modified = Some(date.into());
        self
    }

    /// Sets the block's user.
    pub fn user_id(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Renders the block.
    pub fn build(&self) -> Value {
        let mut block = Map::new();
        block.insert("@case_id".into(), json!(self.id));
        if let Some(date) = &self.date_modified {
            block.insert("@date_modified".into(), json!(date));
        }
        if let Some(user_id) = &self.user_id {
            block.insert("@user_id".into(), json!(user_id));
        }
        if let Some(create) = &self.create {
            block.insert("create".into(), Value::Object(create.clone()));
        }
        if !self.update.is_empty() {
            block.insert("update".into(), Value::Object(self.update.clone()));
        }
        if self.close {
            block.insert("close".into(), json!({}));
        }
        if !self.index.is_empty() {
            block.insert("index".into(), Value::Object(self.index.clone()));
        }
        Value::Object(block)
    }
}

/// Builds a form.
#[derive(Debug, Clone)]
pub struct FormBuilder {
    id: String,
    blocks: Vec<CaseBlock>,
    user_id: String,
    received_on: DateTime<Utc>,
    token: Option<String>,
}

impl FormBuilder {
    /// Starts a form submitted by user `foo`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            blocks: Vec::new(),
            user_id: "foo".into(),
            received_on: base_time(),
            token: None,
        }
    }

    /// Adds a case block.
    pub fn block(mut self, block: CaseBlock) -> Self {
        self.blocks.push(block);
        self
    }

    /// Sets the submitting user.
    pub fn user_id(mut self, user_id: &str) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Sets the receipt time to `minutes` after a fixed base time.
    pub fn minute(mut self, minutes: i64) -> Self {
        self.received_on = base_time() + Duration::minutes(minutes);
        self
    }

    /// Sets the sync token the device held.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Renders the form.
    pub fn build(&self) -> Form {
        let blocks: Vec<Value> = self.blocks.iter().map(CaseBlock::build).collect();
        let body = json!({
            "meta": {"userID": self.user_id, "instanceID": self.id},
            "case": blocks,
        });
        let form = Form::new(&self.id, self.received_on, body)
            .with_domain(TEST_DOMAIN)
            .with_user_id(&self.user_id);
        match &self.token {
            Some(token) => form.with_last_sync_token(token),
            None => form,
        }
    }
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0)
        .single()
        .expect("fixed timestamp is valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_parseable_blocks() {
        let form = FormBuilder::new("f1")
            .block(CaseBlock::new("c1").create("t", "name").owner("g1").update("color", "red"))
            .block(CaseBlock::new("c2").close().index("parent", "t", "c1"))
            .token("log1")
            .build();
        let updates = form.case_updates();
        assert_eq!(updates.len(), 2);
        assert!(updates[0].creates_case());
        assert!(updates[1].has_index_changes());
        assert_eq!(form.last_sync_token.as_deref(), Some("log1"));
        assert_eq!(form.domain.as_deref(), Some(TEST_DOMAIN));
    }
}
