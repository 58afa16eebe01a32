use std::collections::VecDeque;
use tracing::{debug, info};

use super::track::Track;
use crate::error::{PlaybackError, PlaybackResult};

/// Cola FIFO de una guild.
///
/// Owned by the guild's session task, so mutations are already serialized; the queue
/// itself holds no locks.
#[derive(Debug)]
pub struct GuildQueue {
    items: VecDeque<Track>,
    max_size: usize,
}

impl GuildQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Agrega un track al final de la cola
    pub fn enqueue(&mut self, track: Track) -> PlaybackResult<()> {
        if self.items.len() >= self.max_size {
            return Err(PlaybackError::QueueFull { max: self.max_size });
        }

        info!("➕ Agregado a la cola: {}", track.title());
        self.items.push_back(track);
        Ok(())
    }

    /// Inserta al frente (replay). Ignores the size cap so a replay is never refused.
    pub fn enqueue_front(&mut self, track: Track) {
        debug!("⏮️ Insertado al frente: {}", track.title());
        self.items.push_front(track);
    }

    /// Agrega múltiples tracks conservando el orden; devuelve cuántos cupieron
    pub fn enqueue_many(&mut self, tracks: impl IntoIterator<Item = Track>) -> usize {
        let available_space = self.max_size.saturating_sub(self.items.len());
        let before = self.items.len();

        self.items.extend(tracks.into_iter().take(available_space));

        let added = self.items.len() - before;
        info!("➕ Agregadas {} canciones a la cola", added);
        added
    }

    pub fn pop_front(&mut self) -> Option<Track> {
        let next = self.items.pop_front();
        match &next {
            Some(track) => debug!("➡️ Siguiente en cola: {}", track.title()),
            None => debug!("📭 Cola vacía, no hay siguiente track"),
        }
        next
    }

    pub fn peek_front(&self) -> Option<&Track> {
        self.items.front()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        info!("🗑️ Cola limpiada");
    }

    pub fn snapshot(&self) -> Vec<Track> {
        self.items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

/// Read-only copy of a queue, paged for display.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueSnapshot {
    pub items: Vec<Track>,
}

impl QueueSnapshot {
    pub fn new(items: Vec<Track>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Obtiene una página específica de la cola (1-based)
    pub fn page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let per_page = items_per_page.max(1);
        let total_pages = self.items.len().div_ceil(per_page).max(1);
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1) * per_page;
        let end = (start + per_page).min(self.items.len());

        QueuePage {
            items: self.items.get(start..end).map(<[_]>::to_vec).unwrap_or_default(),
            first_position: start + 1,
            current_page,
            total_pages,
            total_items: self.items.len(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    pub items: Vec<Track>,
    /// 1-based queue position of `items[0]`
    pub first_position: usize,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}
