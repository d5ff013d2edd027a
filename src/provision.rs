//! Deployment initialization.
//!
//! [`init_or_load`] is run once per process, before any session is opened.
//! It makes sure exactly one vector store and one assistant exist for this
//! deployment, using the [`ConfigStore`] record as the source of truth:
//!
//! 1. No `vector_store_id` → index the document folder, save the new id.
//! 2. No `assistant_id` → create the assistant bound to the vector store,
//!    save the new id. Otherwise retrieve it to confirm it still exists.
//!
//! The returned [`Deployment`] is shared by reference with every session and
//! handler. The assistant's tool binding is fixed at creation; a later
//! vector store change does not rewire it.

use crate::config::Config;
use crate::config_store::ConfigStore;
use crate::error::Result;
use crate::indexer::index_folder;
use crate::models::AssistantSpec;
use crate::provider::Provider;

/// Remote identifiers of an initialized deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub assistant_id: String,
    pub vector_store_id: String,
}

pub async fn init_or_load(
    provider: &dyn Provider,
    config: &Config,
    store: &ConfigStore,
) -> Result<Deployment> {
    let mut record = store.load()?;

    let vector_store_id = match record.vector_store_id() {
        Some(id) => {
            log::info!("Using vector store {}", id);
            id.to_string()
        }
        None => {
            log::info!(
                "No vector store recorded, indexing {}",
                config.documents.folder.display()
            );
            let report = index_folder(
                provider,
                &config.documents.folder,
                &config.provider.vector_store_name,
            )
            .await?;
            record.vector_store_id = Some(report.vector_store.id.clone());
            store.save(&record)?;
            report.vector_store.id
        }
    };

    let assistant_id = match record.assistant_id() {
        Some(id) => {
            let assistant = provider.retrieve_assistant(id).await?;
            log::info!("Using assistant {} ({})", assistant.id, assistant.model);
            assistant.id
        }
        None => {
            let spec = AssistantSpec {
                name: config.provider.assistant_name.clone(),
                instructions: config.provider.instructions.clone(),
                model: config.provider.model.clone(),
                vector_store_id: vector_store_id.clone(),
            };
            let assistant = provider.create_assistant(&spec).await?;
            log::info!("Created assistant {}", assistant.id);
            record.assistant_id = Some(assistant.id.clone());
            store.save(&record)?;
            assistant.id
        }
    };

    Ok(Deployment {
        assistant_id,
        vector_store_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_store::ConfigRecord;
    use crate::error::Error;
    use crate::provider::{Call, MemoryProvider};
    use std::fs;
    use tempfile::TempDir;

    fn setup(files: &[&str]) -> (TempDir, Config, ConfigStore) {
        let tmp = TempDir::new().unwrap();
        let docs = tmp.path().join("docs");
        fs::create_dir_all(&docs).unwrap();
        for name in files {
            fs::write(docs.join(name), "text").unwrap();
        }
        let config: Config = toml::from_str(&format!(
            "[documents]\nfolder = \"{}\"\n",
            docs.display()
        ))
        .unwrap();
        let store = ConfigStore::new(tmp.path().join("config.json"));
        (tmp, config, store)
    }

    #[tokio::test]
    async fn empty_record_indexes_and_creates_assistant() {
        let (_tmp, config, store) = setup(&["a.pdf", "b.xyz", "c.md"]);
        let provider = MemoryProvider::new();

        let deployment = init_or_load(&provider, &config, &store).await.unwrap();

        let record = store.load().unwrap();
        assert_eq!(record.vector_store_id(), Some(deployment.vector_store_id.as_str()));
        assert_eq!(record.assistant_id(), Some(deployment.assistant_id.as_str()));
        assert!(provider
            .calls()
            .contains(&Call::CreateAssistant(deployment.vector_store_id.clone())));
    }

    #[tokio::test]
    async fn second_init_creates_nothing() {
        let (_tmp, config, store) = setup(&["a.pdf"]);
        let provider = MemoryProvider::new();

        let first = init_or_load(&provider, &config, &store).await.unwrap();
        provider.clear_calls();
        let second = init_or_load(&provider, &config, &store).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.creation_count(), 0);
        assert_eq!(
            provider.calls(),
            vec![Call::RetrieveAssistant(first.assistant_id.clone())]
        );
    }

    #[tokio::test]
    async fn existing_vector_store_skips_indexing() {
        let (_tmp, config, store) = setup(&["a.pdf"]);
        store
            .save(&ConfigRecord {
                vector_store_id: Some("vs_existing".to_string()),
                ..ConfigRecord::default()
            })
            .unwrap();
        let provider = MemoryProvider::new();

        let deployment = init_or_load(&provider, &config, &store).await.unwrap();

        assert_eq!(deployment.vector_store_id, "vs_existing");
        assert_eq!(
            provider.calls(),
            vec![Call::CreateAssistant("vs_existing".to_string())]
        );
    }

    #[tokio::test]
    async fn deleted_assistant_surfaces_provider_error() {
        let (_tmp, config, store) = setup(&[]);
        store
            .save(&ConfigRecord {
                vector_store_id: Some("vs_1".to_string()),
                assistant_id: Some("asst_gone".to_string()),
                ..ConfigRecord::default()
            })
            .unwrap();
        let provider = MemoryProvider::new();

        let err = init_or_load(&provider, &config, &store).await.unwrap_err();
        assert!(matches!(err, Error::Provider { status: Some(404), .. }));
    }
}
