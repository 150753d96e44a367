//! Multi-match keyword topic extraction.
//!
//! Feeds memory tags, the memory context's primary topic and the loop
//! detector's topic counter.

#[derive(Debug, Clone, PartialEq)]
pub struct TopicHit {
    pub topic: String,
    pub hits: usize,
}

struct TopicRule {
    topic: &'static str,
    keywords: &'static [&'static str],
}

const RULES: &[TopicRule] = &[
    TopicRule {
        topic: "work",
        keywords: &["work", "job", "boss", "office", "meeting", "deadline", "project", "career"],
    },
    TopicRule {
        topic: "sleep",
        keywords: &["sleep", "tired", "insomnia", "nap", "bed", "exhausted", "rest"],
    },
    TopicRule {
        topic: "family",
        keywords: &["mom", "dad", "mother", "father", "sister", "brother", "family", "parents"],
    },
    TopicRule {
        topic: "relationships",
        keywords: &["friend", "friends", "partner", "date", "girlfriend", "boyfriend", "breakup"],
    },
    TopicRule {
        topic: "health",
        keywords: &["sick", "doctor", "pain", "headache", "health", "hospital", "medicine"],
    },
    TopicRule {
        topic: "music",
        keywords: &["music", "song", "songs", "album", "band", "guitar", "piano", "concert"],
    },
    TopicRule {
        topic: "games",
        keywords: &["game", "games", "gaming", "play", "level", "boss fight", "quest"],
    },
    TopicRule {
        topic: "food",
        keywords: &["food", "dinner", "lunch", "breakfast", "cook", "cooking", "eat", "hungry"],
    },
    TopicRule {
        topic: "study",
        keywords: &["study", "exam", "school", "class", "homework", "university", "test"],
    },
    TopicRule {
        topic: "feelings",
        keywords: &["feel", "feeling", "sad", "lonely", "anxious", "happy", "upset", "scared"],
    },
];

#[derive(Debug, Clone, Copy, Default)]
pub struct TopicExtractor;

impl TopicExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Every topic with at least one keyword hit, strongest first. Ties keep
    /// table order.
    pub fn extract(&self, text: &str) -> Vec<TopicHit> {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| !w.is_empty())
            .collect();

        let mut hits: Vec<TopicHit> = RULES
            .iter()
            .filter_map(|rule| {
                let count = rule
                    .keywords
                    .iter()
                    .filter(|k| {
                        if k.contains(' ') {
                            lower.contains(**k)
                        } else {
                            words.contains(*k)
                        }
                    })
                    .count();
                (count > 0).then(|| TopicHit {
                    topic: rule.topic.to_string(),
                    hits: count,
                })
            })
            .collect();
        // Stable sort keeps table order among equals.
        hits.sort_by(|a, b| b.hits.cmp(&a.hits));
        hits
    }

    pub fn primary(&self, text: &str) -> Option<String> {
        self.extract(text).into_iter().next().map(|h| h.topic)
    }

    pub fn tags(&self, text: &str) -> Vec<String> {
        self.extract(text).into_iter().map(|h| h.topic).collect()
    }
}
