//! Tantivy schema for the lexical leg.
//!
//! Only ranking-relevant text is indexed; the authoritative document lives
//! in the hybrid store's document table, keyed by the stored `id`.

use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, TEXT,
};

pub const FIELD_ID: &str = "id";
pub const FIELD_REPO_ID: &str = "repo_id";
pub const FIELD_FAMILY: &str = "family";
pub const FIELD_TITLE: &str = "title";
pub const FIELD_CONTENT: &str = "content";
pub const FIELD_TAGS: &str = "tags";

pub fn build_schema() -> Schema {
    let mut builder = Schema::builder();

    let keyword = TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer("raw")
                .set_index_option(IndexRecordOption::Basic),
        )
        .set_stored();

    builder.add_text_field(FIELD_ID, keyword.clone());
    builder.add_text_field(FIELD_REPO_ID, keyword.clone());
    builder.add_text_field(FIELD_FAMILY, keyword);

    builder.add_text_field(FIELD_TITLE, TEXT);
    builder.add_text_field(FIELD_CONTENT, TEXT);
    builder.add_text_field(FIELD_TAGS, TEXT | STORED);

    builder.build()
}

#[derive(Debug, Clone)]
pub struct SchemaFields {
    pub schema: Schema,
    pub id: Field,
    pub repo_id: Field,
    pub family: Field,
    pub title: Field,
    pub content: Field,
    pub tags: Field,
}

impl SchemaFields {
    pub fn new() -> Self {
        let schema = build_schema();
        Self {
            id: schema.get_field(FIELD_ID).expect("id field"),
            repo_id: schema.get_field(FIELD_REPO_ID).expect("repo_id field"),
            family: schema.get_field(FIELD_FAMILY).expect("family field"),
            title: schema.get_field(FIELD_TITLE).expect("title field"),
            content: schema.get_field(FIELD_CONTENT).expect("content field"),
            tags: schema.get_field(FIELD_TAGS).expect("tags field"),
            schema,
        }
    }
}

impl Default for SchemaFields {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_field_count() {
        assert_eq!(build_schema().fields().count(), 6);
    }

    #[test]
    fn test_id_is_stored() {
        let schema = build_schema();
        let field = schema.get_field(FIELD_ID).unwrap();
        assert!(schema.get_field_entry(field).is_stored());
    }
}
