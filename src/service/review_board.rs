use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::errors::{AppError, Result};
use crate::models::{Review, ReviewStats};
use crate::remote::ReviewRemote;
use crate::storage::StateRepository;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

#[derive(Default)]
struct BoardState {
    reviews: Vec<Review>,
    selected_rating: Option<u8>,
}

/// Customer reviews with a star rating, kept in sync with the service.
#[derive(Clone)]
pub struct ReviewBoard {
    state: Arc<Mutex<BoardState>>,
    remote: Arc<dyn ReviewRemote>,
    repository: StateRepository,
    user_id: String,
}

impl ReviewBoard {
    pub fn new(remote: Arc<dyn ReviewRemote>, repository: StateRepository, user_id: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(BoardState::default())),
            remote,
            repository,
            user_id: user_id.into(),
        }
    }

    fn state(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Newest first; reviews without a date go last.
    pub fn reviews(&self) -> Vec<Review> {
        let mut reviews = self.state().reviews.clone();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        reviews
    }

    pub fn is_mine(&self, review: &Review) -> bool {
        review.user_id == self.user_id
    }

    pub fn selected_rating(&self) -> Option<u8> {
        self.state().selected_rating
    }

    pub fn select_rating(&self, rating: u8) -> Result<()> {
        if !(MIN_RATING..=MAX_RATING).contains(&rating) {
            return Err(AppError::invalid(format!(
                "rating must be between {MIN_RATING} and {MAX_RATING}, got {rating}"
            )));
        }
        self.state().selected_rating = Some(rating);
        Ok(())
    }

    /// Reloads reviews from the service, falling back to the local cache.
    pub async fn refresh(&self) -> Result<()> {
        let reviews = match self.remote.list_reviews().await {
            Ok(reviews) => {
                self.cache(&reviews).await;
                reviews
            }
            Err(e) => {
                warn!("Using cached reviews: {e}");
                self.repository.load_reviews().await.unwrap_or_else(|e| {
                    warn!("Ignoring unreadable review cache: {e}");
                    Vec::new()
                })
            }
        };
        self.state().reviews = reviews;
        Ok(())
    }

    /// Posts a review with the selected rating. On success the review is
    /// shown first and the rating selection is cleared.
    pub async fn submit(&self, text: &str) -> Result<Review> {
        let text = text.trim();
        let rating = self
            .selected_rating()
            .ok_or_else(|| AppError::invalid("select a rating before submitting a review"))?;
        if text.is_empty() {
            return Err(AppError::invalid("review text cannot be empty"));
        }

        let review = self.remote.submit_review(rating, text).await?;
        let reviews = {
            let mut st = self.state();
            st.reviews.insert(0, review.clone());
            st.selected_rating = None;
            st.reviews.clone()
        };
        self.cache(&reviews).await;
        debug!("Review {} submitted", review.id);
        Ok(review)
    }

    /// Deletes one of the local user's own reviews.
    pub async fn delete(&self, review_id: i64) -> Result<()> {
        {
            let st = self.state();
            match st.reviews.iter().find(|r| r.id == review_id) {
                None => return Err(AppError::invalid(format!("unknown review {review_id}"))),
                Some(review) if !self.is_mine(review) => {
                    return Err(AppError::invalid("only your own reviews can be deleted"))
                }
                Some(_) => {}
            }
        }

        self.remote.delete_review(review_id).await?;
        let reviews = {
            let mut st = self.state();
            st.reviews.retain(|r| r.id != review_id);
            st.reviews.clone()
        };
        self.cache(&reviews).await;
        Ok(())
    }

    pub async fn stats(&self) -> Result<ReviewStats> {
        self.remote.review_stats().await
    }

    async fn cache(&self, reviews: &[Review]) {
        if let Err(e) = self.repository.save_reviews(reviews).await {
            warn!("Failed to cache reviews: {e}");
        }
    }
}
