pub const SCHEMA: &str = r#"
-- Identities that can sign in with email and password
CREATE TABLE IF NOT EXISTS accounts (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,         -- argon2id hash with embedded salt
    created_at TEXT DEFAULT (datetime('now'))
);

-- Issued sessions; tokens are stored hashed and found by their lookup prefix
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    access_hash TEXT NOT NULL,
    access_lookup TEXT NOT NULL,
    refresh_hash TEXT NOT NULL,
    refresh_lookup TEXT NOT NULL,
    access_expires_at TEXT NOT NULL,
    created_at TEXT DEFAULT (datetime('now'))
);

-- One profile per identity; role is 'admin' or 'user'
CREATE TABLE IF NOT EXISTS profiles (
    id TEXT PRIMARY KEY REFERENCES accounts(id) ON DELETE CASCADE,
    role TEXT NOT NULL DEFAULT 'user',
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT DEFAULT (datetime('now'))
);

-- Managed records, each owned by exactly one identity
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    email TEXT NOT NULL,
    user_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    created_at TEXT DEFAULT (datetime('now')),
    updated_at TEXT
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_access_lookup ON sessions(access_lookup);
CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_refresh_lookup ON sessions(refresh_lookup);
CREATE INDEX IF NOT EXISTS idx_sessions_account ON sessions(account_id);
CREATE INDEX IF NOT EXISTS idx_users_owner ON users(user_id);
CREATE INDEX IF NOT EXISTS idx_users_created ON users(created_at);
"#;
