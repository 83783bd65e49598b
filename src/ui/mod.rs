//! Formato de los mensajes de texto que el bot envía al chat.

pub mod messages;
