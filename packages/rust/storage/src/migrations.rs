//! SQL migration definitions for the feedsync database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: sites, feeds, products, categories, category_product",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Tenants
CREATE TABLE IF NOT EXISTS sites (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    name      TEXT NOT NULL,
    subdomain TEXT NOT NULL UNIQUE
);

-- Configured affiliate feeds
CREATE TABLE IF NOT EXISTS feeds (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id                 INTEGER NOT NULL REFERENCES sites(id) ON DELETE CASCADE,
    name                    TEXT NOT NULL,
    url                     TEXT NOT NULL,
    network                 TEXT NOT NULL,
    field_mapping_json      TEXT,
    allow_empty_description INTEGER NOT NULL DEFAULT 0,
    sync_categories         INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_feeds_site_id ON feeds(site_id);

-- Canonical products; deleted_at NULL means active
CREATE TABLE IF NOT EXISTS products (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id             INTEGER NOT NULL REFERENCES sites(id) ON DELETE CASCADE,
    feed_id             INTEGER NOT NULL REFERENCES feeds(id) ON DELETE CASCADE,
    identifier          TEXT NOT NULL,
    name                TEXT NOT NULL,
    name_by_user        TEXT,
    slug                TEXT NOT NULL,
    description         TEXT NOT NULL DEFAULT '',
    description_by_user TEXT,
    price               REAL NOT NULL DEFAULT 0,
    regular_price       REAL NOT NULL DEFAULT 0,
    currency            TEXT NOT NULL DEFAULT '',
    shipping_price      REAL NOT NULL DEFAULT 0,
    in_stock            INTEGER NOT NULL DEFAULT 0,
    url                 TEXT NOT NULL DEFAULT '',
    graphic_url         TEXT NOT NULL DEFAULT '',
    keywords            TEXT NOT NULL DEFAULT '',
    has_categories      INTEGER NOT NULL DEFAULT 0,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL,
    deleted_at          TEXT,
    UNIQUE(feed_id, identifier)
);

CREATE INDEX IF NOT EXISTS idx_products_feed_id ON products(feed_id);
CREATE INDEX IF NOT EXISTS idx_products_site_id ON products(site_id);

-- Site category catalog
CREATE TABLE IF NOT EXISTS categories (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    site_id     INTEGER NOT NULL REFERENCES sites(id) ON DELETE CASCADE,
    name        TEXT NOT NULL,
    slug        TEXT NOT NULL DEFAULT '',
    keywords    TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    provenance  TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_categories_site_id ON categories(site_id);

-- Category/product links; duplicates are pruned by the reconciler, not the schema
CREATE TABLE IF NOT EXISTS category_product (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
    product_id  INTEGER NOT NULL REFERENCES products(id) ON DELETE CASCADE,
    provenance  TEXT NOT NULL,
    forced      INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_category_product_product ON category_product(product_id);
CREATE INDEX IF NOT EXISTS idx_category_product_category ON category_product(category_id);

INSERT OR IGNORE INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Remove category links together with their category",
            sql: r#"
CREATE TRIGGER IF NOT EXISTS categories_delete_links AFTER DELETE ON categories BEGIN
    DELETE FROM category_product WHERE category_id = OLD.id;
END;

INSERT OR IGNORE INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
