use libsql::Connection;

use crate::error::Result;

pub async fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- File screening rows produced by the external watcher
        CREATE TABLE IF NOT EXISTS t_file_screening (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_path TEXT NOT NULL,
            file_name TEXT NOT NULL,
            file_size INTEGER NOT NULL DEFAULT 0,
            extension TEXT,
            file_hash TEXT,
            created_time TEXT,
            modified_time TEXT,
            category_id INTEGER,
            matched_rules TEXT,
            extra_metadata TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            error_message TEXT,
            tagged_time TEXT,
            tags_display_ids TEXT,
            task_id INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(file_path, file_hash)
        );

        CREATE INDEX IF NOT EXISTS idx_screening_status ON t_file_screening(status);
        CREATE INDEX IF NOT EXISTS idx_screening_task_id ON t_file_screening(task_id);
        CREATE INDEX IF NOT EXISTS idx_screening_file_path ON t_file_screening(file_path);

        -- Interned tags
        CREATE TABLE IF NOT EXISTS t_tags (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            type TEXT NOT NULL DEFAULT 'llm'
        );

        -- Documents submitted to the chunking pipeline
        CREATE TABLE IF NOT EXISTS t_documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_path TEXT NOT NULL UNIQUE,
            file_hash TEXT NOT NULL,
            docling_json_path TEXT,
            status TEXT NOT NULL DEFAULT 'processing',
            processed_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_documents_status ON t_documents(status);

        -- Parent chunks: raw content for answer synthesis
        CREATE TABLE IF NOT EXISTS t_parent_chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id INTEGER NOT NULL REFERENCES t_documents(id) ON DELETE CASCADE,
            chunk_type TEXT NOT NULL DEFAULT 'text',
            content TEXT NOT NULL,
            metadata TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_parent_chunks_document ON t_parent_chunks(document_id);

        -- Child chunks: retrieval summaries, 1:1 with vector records
        CREATE TABLE IF NOT EXISTS t_child_chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            parent_chunk_id INTEGER NOT NULL REFERENCES t_parent_chunks(id) ON DELETE CASCADE,
            retrieval_content TEXT NOT NULL,
            vector_id TEXT NOT NULL UNIQUE
        );

        CREATE INDEX IF NOT EXISTS idx_child_chunks_parent ON t_child_chunks(parent_chunk_id);

        -- Persistent task queue
        CREATE TABLE IF NOT EXISTS t_tasks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_name TEXT NOT NULL,
            task_type TEXT NOT NULL,
            priority TEXT NOT NULL DEFAULT 'MEDIUM',
            status TEXT NOT NULL DEFAULT 'PENDING',
            result TEXT,
            extra_data TEXT,
            target_file_path TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            start_time TEXT,
            error_message TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_tasks_status_priority ON t_tasks(status, priority, created_at);

        -- Chat sessions (soft-deleted via is_active)
        CREATE TABLE IF NOT EXISTS t_chat_sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            metadata TEXT,
            is_active INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS t_chat_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER NOT NULL REFERENCES t_chat_sessions(id) ON DELETE CASCADE,
            message_id TEXT NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            parts TEXT,
            metadata TEXT,
            sources TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_session ON t_chat_messages(session_id);

        CREATE TABLE IF NOT EXISTS t_pinned_files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id INTEGER NOT NULL REFERENCES t_chat_sessions(id) ON DELETE CASCADE,
            file_path TEXT NOT NULL,
            file_name TEXT NOT NULL,
            pinned_at TEXT NOT NULL,
            metadata TEXT,
            UNIQUE(session_id, file_path)
        );

        -- Model provider registry
        CREATE TABLE IF NOT EXISTS t_model_providers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            display_name TEXT NOT NULL,
            base_url TEXT,
            api_key TEXT,
            use_proxy INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS t_model_configurations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            provider_id INTEGER NOT NULL REFERENCES t_model_providers(id) ON DELETE CASCADE,
            model_identifier TEXT NOT NULL,
            display_name TEXT NOT NULL,
            max_context_length INTEGER,
            max_output_tokens INTEGER,
            capabilities TEXT NOT NULL DEFAULT '[]',
            is_enabled INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(provider_id, model_identifier)
        );

        -- Exactly one configuration per capability
        CREATE TABLE IF NOT EXISTS t_capability_assignments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            capability TEXT NOT NULL UNIQUE,
            model_configuration_id INTEGER NOT NULL REFERENCES t_model_configurations(id) ON DELETE CASCADE,
            updated_at TEXT NOT NULL
        );

        -- Key/value system configuration
        CREATE TABLE IF NOT EXISTS t_system_config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        -- Monitored folders (whitelist parents, blacklist children)
        CREATE TABLE IF NOT EXISTS t_monitored_directories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            path TEXT NOT NULL UNIQUE,
            alias TEXT,
            is_blacklist INTEGER NOT NULL DEFAULT 0,
            parent_id INTEGER REFERENCES t_monitored_directories(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        -- Per-OS bundle extensions (macOS packages treated as files)
        CREATE TABLE IF NOT EXISTS t_bundle_extensions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            extension TEXT NOT NULL UNIQUE,
            os TEXT NOT NULL DEFAULT 'macos',
            created_at TEXT NOT NULL
        );

        -- File categories and the extension map the watcher classifies with
        CREATE TABLE IF NOT EXISTS t_file_categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            icon TEXT
        );

        CREATE TABLE IF NOT EXISTS t_file_extension_map (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            extension TEXT NOT NULL UNIQUE,
            category_id INTEGER NOT NULL REFERENCES t_file_categories(id) ON DELETE CASCADE,
            description TEXT,
            priority TEXT NOT NULL DEFAULT 'medium'
        );

        CREATE INDEX IF NOT EXISTS idx_extension_map_category ON t_file_extension_map(category_id);

        -- Screening filter rules (filename/extension/folder patterns)
        CREATE TABLE IF NOT EXISTS t_file_filter_rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            rule_type TEXT NOT NULL DEFAULT 'filename',
            pattern TEXT NOT NULL,
            pattern_type TEXT NOT NULL DEFAULT 'regex',
            action TEXT NOT NULL,
            priority TEXT NOT NULL DEFAULT 'medium',
            enabled INTEGER NOT NULL DEFAULT 1,
            category_id INTEGER REFERENCES t_file_categories(id) ON DELETE SET NULL,
            extra_data TEXT
        );

        -- Project-folder recognition rules
        CREATE TABLE IF NOT EXISTS t_project_recognition_rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            rule_type TEXT NOT NULL DEFAULT 'name_pattern',
            pattern TEXT NOT NULL,
            priority TEXT NOT NULL DEFAULT 'medium',
            indicators TEXT,
            enabled INTEGER NOT NULL DEFAULT 1
        );
        "#,
    )
    .await?;

    seed_default_rules(conn).await?;

    // Inverted tag index. The CSV on the screening row is the source of
    // truth; this mirror is rewritten by application code in the same
    // write path (no triggers).
    init_fts(conn).await?;

    Ok(())
}

async fn init_fts(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS t_files_fts USING fts5(
            file_id UNINDEXED,
            tags_search_ids
        );
        "#,
    )
    .await?;

    Ok(())
}

/// Baseline categories, extension map and screening rules so a fresh
/// install classifies files before the user touches rule management.
/// Idempotent: names are unique and everything is INSERT OR IGNORE, so
/// user edits survive restarts.
async fn seed_default_rules(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        INSERT OR IGNORE INTO t_file_categories (name, description, icon) VALUES
            ('document', 'Text documents, slides and spreadsheets', 'file-text'),
            ('image', 'Pictures and screenshots', 'image'),
            ('audio_video', 'Audio and video recordings', 'film'),
            ('archive', 'Compressed archives and disk images', 'archive'),
            ('code', 'Source code and notebooks', 'code'),
            ('design', 'Design source files', 'pen-tool'),
            ('other', 'Everything unclassified', 'file');

        INSERT OR IGNORE INTO t_file_extension_map (extension, category_id, priority)
        SELECT ext, (SELECT id FROM t_file_categories WHERE name = cat), prio FROM (
            SELECT 'pdf' AS ext, 'document' AS cat, 'high' AS prio
            UNION ALL SELECT 'docx', 'document', 'high'
            UNION ALL SELECT 'pptx', 'document', 'high'
            UNION ALL SELECT 'xlsx', 'document', 'high'
            UNION ALL SELECT 'xls', 'document', 'medium'
            UNION ALL SELECT 'md', 'document', 'high'
            UNION ALL SELECT 'markdown', 'document', 'medium'
            UNION ALL SELECT 'txt', 'document', 'medium'
            UNION ALL SELECT 'png', 'image', 'medium'
            UNION ALL SELECT 'jpg', 'image', 'medium'
            UNION ALL SELECT 'jpeg', 'image', 'medium'
            UNION ALL SELECT 'gif', 'image', 'low'
            UNION ALL SELECT 'webp', 'image', 'low'
            UNION ALL SELECT 'mp3', 'audio_video', 'medium'
            UNION ALL SELECT 'wav', 'audio_video', 'low'
            UNION ALL SELECT 'mp4', 'audio_video', 'medium'
            UNION ALL SELECT 'mov', 'audio_video', 'low'
            UNION ALL SELECT 'zip', 'archive', 'medium'
            UNION ALL SELECT 'tar', 'archive', 'low'
            UNION ALL SELECT 'gz', 'archive', 'low'
            UNION ALL SELECT '7z', 'archive', 'low'
            UNION ALL SELECT 'rs', 'code', 'medium'
            UNION ALL SELECT 'py', 'code', 'medium'
            UNION ALL SELECT 'js', 'code', 'medium'
            UNION ALL SELECT 'ts', 'code', 'medium'
            UNION ALL SELECT 'ipynb', 'code', 'medium'
            UNION ALL SELECT 'psd', 'design', 'medium'
            UNION ALL SELECT 'sketch', 'design', 'medium'
        );

        INSERT OR IGNORE INTO t_file_filter_rules
            (name, description, rule_type, pattern, pattern_type, action, priority, enabled)
        VALUES
            ('hidden files', 'Dotfiles are never screened',
             'filename', '^\..*', 'regex', 'exclude', 'high', 1),
            ('office temp files', 'Editor lock/autosave files',
             'filename', '~$*', 'glob', 'exclude', 'high', 1),
            ('dependency folders', 'Vendored dependency trees',
             'folder', 'node_modules', 'keyword', 'exclude', 'high', 1),
            ('build output folders', 'Compiler output trees',
             'folder', 'target', 'keyword', 'exclude', 'medium', 1),
            ('screenshots', 'OS screenshot naming convention',
             'filename', '^(Screenshot|Screen Shot) .*', 'regex', 'label', 'low', 1);

        INSERT OR IGNORE INTO t_project_recognition_rules
            (name, description, rule_type, pattern, priority, indicators, enabled)
        VALUES
            ('version controlled project', 'Any folder with a VCS marker',
             'structure', '.*', 'high',
             '{"structure_markers": [".git", ".hg", ".svn"]}', 1),
            ('language project roots', 'Build manifests marking a project root',
             'structure', '.*', 'medium',
             '{"structure_markers": ["Cargo.toml", "package.json", "pyproject.toml", "go.mod"]}', 1),
            ('project-suffixed folders', 'Folders named like projects',
             'name_pattern', '.*(-project|_project|\.xcodeproj)$', 'low', NULL, 1);
        "#,
    )
    .await?;

    Ok(())
}
