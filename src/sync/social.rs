//! Friends, friend requests, user search and the friends feed.
//!
//! None of this is optimistic: the store only changes when the backend
//! answers, and a successful friend action reloads the friend list.

use crate::api::models::{Ack, FeedPage, FriendsList, RemoteId, UserSearch};
use crate::logging::LogLevel;

use super::{Answer, SyncCore, SyncMsg};

/// A friend-list change the user can request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FriendAction {
    Request(String),
    Accept(RemoteId),
    Decline(RemoteId),
    Remove(RemoteId),
}

impl FriendAction {
    fn label(&self) -> String {
        match self {
            FriendAction::Request(username) => format!("Friend request sent to {username}"),
            FriendAction::Accept(id) => format!("Accepted friend request {id}"),
            FriendAction::Decline(id) => format!("Declined friend request {id}"),
            FriendAction::Remove(id) => format!("Removed friend {id}"),
        }
    }
}

impl SyncCore {
    pub fn load_friends(&mut self) {
        if !self.ensure_session() {
            return;
        }
        let api = self.api.clone();
        self.dispatch(async move { api.friends().await }, |reply| {
            SyncMsg::Friends { reply }
        });
    }

    pub(super) fn on_friends(&mut self, reply: Answer<FriendsList>) {
        let Some(list) = self.accept("load friends", reply) else {
            return;
        };
        let message = format!(
            "{} friends, {} pending requests",
            list.friends.len(),
            list.requests.len()
        );
        self.store.replace_friends(list);
        self.activity.log(LogLevel::Info, message);
    }

    pub fn friend_action(&mut self, action: FriendAction) {
        if !self.ensure_session() {
            return;
        }
        let label = action.label();
        let api = self.api.clone();
        self.dispatch(
            async move {
                match &action {
                    FriendAction::Request(username) => api.send_friend_request(username).await,
                    FriendAction::Accept(id) => api.accept_friend_request(id).await,
                    FriendAction::Decline(id) => api.decline_friend_request(id).await,
                    FriendAction::Remove(id) => api.remove_friend(id).await,
                }
            },
            move |reply| SyncMsg::FriendAction { label, reply },
        );
    }

    pub(super) fn on_friend_action(&mut self, label: String, reply: Answer<Ack>) {
        if self.accept("friend action", reply).is_some() {
            self.activity.log(LogLevel::Success, label);
            self.load_friends();
        }
    }

    pub fn search_users(&mut self, query: &str) {
        let query = query.trim();
        if query.is_empty() || !self.ensure_session() {
            return;
        }
        let api = self.api.clone();
        let query = query.to_string();
        let call_query = query.clone();
        self.dispatch(
            async move { api.search_users(&call_query).await },
            move |reply| SyncMsg::SearchResults { query, reply },
        );
    }

    pub(super) fn on_search_results(&mut self, query: String, reply: Answer<UserSearch>) {
        let Some(found) = self.accept("search users", reply) else {
            return;
        };
        let message = format!("{} users match `{query}`", found.users.len());
        self.store.set_search_results(&query, found.users);
        self.activity.log(LogLevel::Info, message);
    }

    /// Load the first feed page, or the next one when `more` is set.
    pub fn load_feed(&mut self, more: bool) {
        if !self.ensure_session() {
            return;
        }
        let social = self.store.social();
        if more && !social.feed_has_more {
            self.activity
                .log(LogLevel::Info, "No older feed entries".to_string());
            return;
        }
        let offset = if more { social.feed_next_offset } else { 0 };
        let limit = self.timings.feed_page_size;
        let api = self.api.clone();
        self.dispatch(async move { api.feed(limit, offset).await }, move |reply| {
            SyncMsg::FeedPage { offset, reply }
        });
    }

    pub(super) fn on_feed_page(&mut self, offset: usize, reply: Answer<FeedPage>) {
        if let Some(page) = self.accept("load feed", reply) {
            self.store.apply_feed_page(offset, page);
        }
    }
}
