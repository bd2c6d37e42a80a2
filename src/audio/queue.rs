use rand::Rng;
use serenity::model::id::UserId;
use std::{collections::VecDeque, time::Duration};
use tracing::{debug, info};

use super::track::Track;
use crate::error::SessionError;

/// Cola FIFO de una sesión. Solo la muta el actor dueño de la sesión.
#[derive(Debug)]
pub struct MusicQueue {
    items: VecDeque<Track>,
    max_size: usize,
}

impl MusicQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Agrega un track al final y devuelve su posición (1-based)
    pub fn push(&mut self, track: Track) -> Result<usize, SessionError> {
        if self.items.len() >= self.max_size {
            return Err(SessionError::QueueFull { max: self.max_size });
        }

        info!("➕ Agregado a la cola: {}", track.title());
        self.items.push_back(track);

        Ok(self.items.len())
    }

    /// Agrega múltiples tracks (playlist) hasta llenar la cola
    pub fn extend(&mut self, tracks: Vec<Track>) -> usize {
        let available_space = self.max_size.saturating_sub(self.items.len());
        let to_add = tracks.len().min(available_space);

        self.items.extend(tracks.into_iter().take(to_add));

        if to_add > 0 {
            info!("➕ Agregadas {} canciones a la cola", to_add);
        }
        to_add
    }

    /// Obtiene el siguiente track (FIFO)
    pub fn pop_front(&mut self) -> Option<Track> {
        let next = self.items.pop_front();
        if let Some(ref item) = next {
            debug!("➡️ Siguiente en cola (FIFO): {}", item.title());
        }
        next
    }

    /// Mezcla solo los tracks pedidos por `user`.
    ///
    /// Fisher–Yates sobre los índices que coinciden: los tracks de otros
    /// usuarios no cambian de posición. Devuelve cuántos tracks participaron.
    pub fn shuffle_requested_by<R: Rng + ?Sized>(&mut self, user: UserId, rng: &mut R) -> usize {
        let indices: Vec<usize> = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, track)| track.requested_by() == user)
            .map(|(index, _)| index)
            .collect();

        for i in (1..indices.len()).rev() {
            let j = rng.gen_range(0..=i);
            self.items.swap(indices[i], indices[j]);
        }

        info!("🔀 {} canciones de {} mezcladas", indices.len(), user);
        indices.len()
    }

    /// Limpia la cola
    pub fn clear(&mut self) -> usize {
        let cleared = self.items.len();
        self.items.clear();
        cleared
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

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.items.iter()
    }

    /// Obtiene información de la cola junto con el track actual
    pub fn info(&self, current: Option<&Track>) -> QueueInfo {
        let queue_duration: Duration = self.items.iter().filter_map(|item| item.duration()).sum();
        let current_duration = current.and_then(|c| c.duration()).unwrap_or_default();

        QueueInfo {
            current: current.cloned(),
            items: self.items.iter().cloned().collect(),
            total_items: self.items.len(),
            total_duration: queue_duration + current_duration,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueInfo {
    pub current: Option<Track>,
    pub items: Vec<Track>,
    pub total_items: usize,
    pub total_duration: Duration,
}

impl QueueInfo {
    /// Obtiene una página específica de la cola
    pub fn get_page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let items_per_page = items_per_page.max(1);
        let safe_page = page.max(1);
        let start = (safe_page - 1) * items_per_page;
        let end = (start + items_per_page).min(self.items.len());
        let total_pages = if self.total_items == 0 {
            1
        } else {
            self.total_items.div_ceil(items_per_page)
        };

        QueuePage {
            items: if start < self.items.len() {
                self.items[start..end].to_vec()
            } else {
                Vec::new()
            },
            first_position: start + 1,
            current_page: safe_page,
            total_pages,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePage {
    pub items: Vec<Track>,
    /// Posición en la cola (1-based) del primer item de la página
    pub first_position: usize,
    pub current_page: usize,
    pub total_pages: usize,
}
