//! The SocialConnect schema: table definitions followed by the incremental
//! patches applied on top of them.

use socialconnect_common::Result;

use crate::migrations::{MigrationPlan, MigrationStep, ReferentialAction};

/// `(table, CREATE TABLE statement)` in dependency order: every table appears
/// after the tables its foreign keys reference.
pub const TABLES: &[(&str, &str)] = &[
    (
        "users",
        "CREATE TABLE IF NOT EXISTS users (
    username VARCHAR(50) PRIMARY KEY,
    location VARCHAR(100),
    bio TEXT,
    mailid VARCHAR(100) UNIQUE NOT NULL,
    website VARCHAR(200),
    fname VARCHAR(50),
    lname VARCHAR(50),
    photo LONGTEXT,
    dateofbirth DATE,
    joined_from DATE
)",
    ),
    (
        "tweet",
        "CREATE TABLE IF NOT EXISTS tweet (
    tweetid INT PRIMARY KEY,
    content_ TEXT,
    photo LONGTEXT,
    time_ TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    author VARCHAR(50),
    FOREIGN KEY (author) REFERENCES users(username) ON DELETE CASCADE
)",
    ),
    (
        "like_",
        "CREATE TABLE IF NOT EXISTS like_ (
    username VARCHAR(50),
    tweetid INT,
    PRIMARY KEY (username, tweetid),
    FOREIGN KEY (username) REFERENCES users(username) ON DELETE CASCADE,
    FOREIGN KEY (tweetid) REFERENCES tweet(tweetid) ON DELETE CASCADE
)",
    ),
    (
        "comment_",
        "CREATE TABLE IF NOT EXISTS comment_ (
    _id INT AUTO_INCREMENT PRIMARY KEY,
    time_ TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    tweetid INT,
    username VARCHAR(50),
    content_ TEXT,
    FOREIGN KEY (tweetid) REFERENCES tweet(tweetid) ON DELETE CASCADE,
    FOREIGN KEY (username) REFERENCES users(username) ON DELETE CASCADE
)",
    ),
    (
        "follows",
        "CREATE TABLE IF NOT EXISTS follows (
    follower VARCHAR(50),
    follows VARCHAR(50),
    PRIMARY KEY (follower, follows),
    FOREIGN KEY (follower) REFERENCES users(username) ON DELETE CASCADE,
    FOREIGN KEY (follows) REFERENCES users(username) ON DELETE CASCADE
)",
    ),
    (
        "poll",
        "CREATE TABLE IF NOT EXISTS poll (
    id_ INT PRIMARY KEY,
    content_ TEXT,
    poll_by VARCHAR(50),
    time_ TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (poll_by) REFERENCES users(username) ON DELETE CASCADE
)",
    ),
    (
        "poll_option",
        "CREATE TABLE IF NOT EXISTS poll_option (
    poll_id INT,
    option_ VARCHAR(200),
    PRIMARY KEY (poll_id, option_),
    FOREIGN KEY (poll_id) REFERENCES poll(id_) ON DELETE CASCADE
)",
    ),
    (
        "vote",
        "CREATE TABLE IF NOT EXISTS vote (
    username VARCHAR(50),
    poll_id INT,
    poll_option_ VARCHAR(200),
    PRIMARY KEY (username, poll_id),
    FOREIGN KEY (username) REFERENCES users(username) ON DELETE CASCADE,
    FOREIGN KEY (poll_id) REFERENCES poll(id_) ON DELETE CASCADE
)",
    ),
    (
        "group_",
        "CREATE TABLE IF NOT EXISTS group_ (
    grpname VARCHAR(50) PRIMARY KEY,
    admin VARCHAR(50),
    photo LONGTEXT,
    bio TEXT,
    FOREIGN KEY (admin) REFERENCES users(username) ON DELETE CASCADE
)",
    ),
    (
        "group_members",
        "CREATE TABLE IF NOT EXISTS group_members (
    grp_name VARCHAR(50),
    grpmem VARCHAR(50),
    PRIMARY KEY (grp_name, grpmem),
    FOREIGN KEY (grp_name) REFERENCES group_(grpname) ON DELETE CASCADE,
    FOREIGN KEY (grpmem) REFERENCES users(username) ON DELETE CASCADE
)",
    ),
    (
        "chat",
        "CREATE TABLE IF NOT EXISTS chat (
    id INT AUTO_INCREMENT PRIMARY KEY,
    sender VARCHAR(50),
    receiver VARCHAR(50),
    msg TEXT,
    time_ TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (sender) REFERENCES users(username) ON DELETE CASCADE,
    FOREIGN KEY (receiver) REFERENCES users(username) ON DELETE CASCADE
)",
    ),
    (
        "group_chat",
        "CREATE TABLE IF NOT EXISTS group_chat (
    id INT AUTO_INCREMENT PRIMARY KEY,
    grp_name VARCHAR(50),
    sender VARCHAR(50),
    message TEXT,
    time_ TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (grp_name) REFERENCES group_(grpname) ON DELETE CASCADE,
    FOREIGN KEY (sender) REFERENCES users(username) ON DELETE CASCADE
)",
    ),
    (
        "group_requests",
        "CREATE TABLE IF NOT EXISTS group_requests (
    id INT AUTO_INCREMENT PRIMARY KEY,
    grp_name VARCHAR(50),
    username VARCHAR(50),
    request_time TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    status ENUM('pending', 'approved', 'rejected') DEFAULT 'pending',
    FOREIGN KEY (grp_name) REFERENCES group_(grpname) ON DELETE CASCADE,
    FOREIGN KEY (username) REFERENCES users(username) ON DELETE CASCADE,
    UNIQUE KEY (grp_name, username)
)",
    ),
    (
        "follow_requests",
        "CREATE TABLE IF NOT EXISTS follow_requests (
    id INT AUTO_INCREMENT PRIMARY KEY,
    requester VARCHAR(50),
    target VARCHAR(50),
    request_time TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    status ENUM('pending', 'approved', 'rejected') DEFAULT 'pending',
    FOREIGN KEY (requester) REFERENCES users(username) ON DELETE CASCADE,
    FOREIGN KEY (target) REFERENCES users(username) ON DELETE CASCADE,
    UNIQUE KEY (requester, target)
)",
    ),
];

/// Schema changes made after the initial tables shipped.
pub fn patches() -> Vec<MigrationStep> {
    vec![
        // Deployments created before request statuses existed lack the column.
        MigrationStep::add_column(
            "follow_requests",
            "status",
            "VARCHAR(20) NOT NULL DEFAULT 'pending'",
        ),
        MigrationStep::backfill("follow_requests", "status", "pending"),
        MigrationStep::add_column("tweet", "group_name", "VARCHAR(50) NULL"),
        MigrationStep::add_foreign_key("tweet", "group_name", "group_", "grpname")
            .with_constraint("fk_tweet_group")
            .on_delete(ReferentialAction::Cascade),
    ]
}

/// The complete plan: every table, then every patch.
pub fn socialconnect_plan() -> Result<MigrationPlan> {
    let mut steps: Vec<MigrationStep> = TABLES
        .iter()
        .map(|(table, ddl)| MigrationStep::create_table(*table, *ddl))
        .collect();
    steps.extend(patches());
    MigrationPlan::new(steps)
}
