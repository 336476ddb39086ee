//! Sliding-window rate limiting per route category and user.
//!
//! Each key (`category:user_id`) keeps the timestamps of its recent events; an
//! event counts while it sits inside the trailing window and is evicted once the
//! window rolls past it. The counter store is shared process-wide behind a mutex
//! so concurrent requests for the same key observe a single quota.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use time::{Duration, OffsetDateTime};

/// Quota buckets, one per rate-limited route.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RouteCategory {
    /// Sending a message in a chat.
    ChatMessages,
    /// Creating a new chat via upload.
    NewChat,
    /// Fetching a chat's message history.
    ChatHistory,
    /// Listing a user's chats.
    ChatList,
}

impl RouteCategory {
    /// Stable key prefix for the category.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChatMessages => "chat_messages",
            Self::NewChat => "new_chat",
            Self::ChatHistory => "chat_history",
            Self::ChatList => "chat_list",
        }
    }
}

/// A single quota: at most `limit` events per trailing `window`.
#[derive(Clone, Copy, Debug)]
pub struct RateRule {
    /// Maximum number of events inside the window.
    pub limit: u32,
    /// Trailing window length.
    pub window: Duration,
}

/// Quotas for every route category.
#[derive(Clone, Copy, Debug)]
pub struct RateLimits {
    /// Messages sent per chat owner (default 5 per day).
    pub chat_messages: RateRule,
    /// New chats created per user (default 1 per day).
    pub new_chat: RateRule,
    /// History fetches per user (default 10 per minute).
    pub chat_history: RateRule,
    /// Chat-list fetches per user (default 10 per minute).
    pub chat_list: RateRule,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            chat_messages: RateRule {
                limit: 5,
                window: Duration::days(1),
            },
            new_chat: RateRule {
                limit: 1,
                window: Duration::days(1),
            },
            chat_history: RateRule {
                limit: 10,
                window: Duration::minutes(1),
            },
            chat_list: RateRule {
                limit: 10,
                window: Duration::minutes(1),
            },
        }
    }
}

impl RateLimits {
    fn rule(&self, category: RouteCategory) -> RateRule {
        match category {
            RouteCategory::ChatMessages => self.chat_messages,
            RouteCategory::NewChat => self.new_chat,
            RouteCategory::ChatHistory => self.chat_history,
            RouteCategory::ChatList => self.chat_list,
        }
    }
}

/// Outcome of a quota check.
#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    /// Whether the event was admitted (and counted).
    pub allowed: bool,
    /// Configured limit for the key's category.
    pub limit: u32,
    /// Events still available inside the current window.
    pub remaining: u32,
    /// Seconds until the oldest counted event leaves the window.
    pub retry_after_seconds: u64,
}

/// Sliding-window limiter shared across all request handlers.
#[derive(Clone)]
pub struct SlidingWindowLimiter {
    limits: RateLimits,
    state: Arc<Mutex<HashMap<String, VecDeque<OffsetDateTime>>>>,
}

impl SlidingWindowLimiter {
    /// Construct a limiter with the given quotas.
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Check and count an event for `user_id` under `category`.
    pub fn check(&self, category: RouteCategory, user_id: &str) -> RateDecision {
        self.check_at(category, user_id, OffsetDateTime::now_utc())
    }

    /// Check against an explicit clock reading; the quota is only consumed when
    /// the decision is an admit.
    pub fn check_at(
        &self,
        category: RouteCategory,
        user_id: &str,
        now: OffsetDateTime,
    ) -> RateDecision {
        let rule = self.limits.rule(category);
        let key = format!("{}:{user_id}", category.as_str());

        let mut state = self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Rate limiter lock poisoned, recovering");
            poisoned.into_inner()
        });

        let events = state.entry(key).or_default();
        while let Some(front) = events.front()
            && *front + rule.window <= now
        {
            events.pop_front();
        }

        if events.len() as u32 >= rule.limit {
            let retry_after_seconds = events
                .front()
                .map(|front| seconds_until(*front + rule.window, now))
                .unwrap_or(0);
            return RateDecision {
                allowed: false,
                limit: rule.limit,
                remaining: 0,
                retry_after_seconds,
            };
        }

        events.push_back(now);
        let remaining = rule.limit - events.len() as u32;
        RateDecision {
            allowed: true,
            limit: rule.limit,
            remaining,
            retry_after_seconds: 0,
        }
    }
}

fn seconds_until(deadline: OffsetDateTime, now: OffsetDateTime) -> u64 {
    let millis = (deadline - now).whole_milliseconds();
    if millis <= 0 {
        0
    } else {
        ((millis + 999) / 1000) as u64
    }
}
