use super::{Attribute, Event, EventSink, XmlName};
use crate::error::{Location, SqlXmlError};

/// A recorded span of events that can be replayed any number of times.
///
/// Each event keeps the template location it was read at, so directives
/// found while replaying still report where they were written. Events
/// pushed through the [`EventSink`] impl (computed content) take the
/// buffer's anchor location.
#[derive(Debug, Clone, Default)]
pub struct EventBuffer {
    events: Vec<(Event, Location)>,
    anchor: Location,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn anchored(anchor: Location) -> Self {
        EventBuffer {
            events: Vec::new(),
            anchor,
        }
    }

    pub fn record(&mut self, event: Event, location: Location) {
        self.events.push((event, location));
    }

    /// Sends every recorded event to `sink`, in order. The buffer is left
    /// untouched, so replays can repeat.
    pub fn replay(&self, sink: &mut dyn EventSink) -> Result<(), SqlXmlError> {
        for (event, _) in &self.events {
            event.send_to(sink)?;
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Event, &Location)> {
        self.events.iter().map(|(e, l)| (e, l))
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(e, _)| e)
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn anchor(&self) -> &Location {
        &self.anchor
    }

    /// The concatenated character content, ignoring markup.
    pub fn text(&self) -> String {
        self.events()
            .filter_map(|e| match e {
                Event::Characters(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    fn push(&mut self, event: Event) {
        let location = self.anchor.clone();
        self.events.push((event, location));
    }
}

impl EventSink for EventBuffer {
    fn start_document(&mut self) -> Result<(), SqlXmlError> {
        self.push(Event::StartDocument);
        Ok(())
    }

    fn end_document(&mut self) -> Result<(), SqlXmlError> {
        self.push(Event::EndDocument);
        Ok(())
    }

    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) -> Result<(), SqlXmlError> {
        self.push(Event::StartPrefixMapping {
            prefix: prefix.to_string(),
            uri: uri.to_string(),
        });
        Ok(())
    }

    fn end_prefix_mapping(&mut self, prefix: &str) -> Result<(), SqlXmlError> {
        self.push(Event::EndPrefixMapping {
            prefix: prefix.to_string(),
        });
        Ok(())
    }

    fn start_element(&mut self, name: &XmlName, attributes: &[Attribute]) -> Result<(), SqlXmlError> {
        self.push(Event::StartElement {
            name: name.clone(),
            attributes: attributes.to_vec(),
        });
        Ok(())
    }

    fn end_element(&mut self, name: &XmlName) -> Result<(), SqlXmlError> {
        self.push(Event::EndElement { name: name.clone() });
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<(), SqlXmlError> {
        // Adjacent character runs are merged.
        if let Some((Event::Characters(last), _)) = self.events.last_mut() {
            last.push_str(text);
        } else {
            self.push(Event::Characters(text.to_string()));
        }
        Ok(())
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), SqlXmlError> {
        self.push(Event::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EventBuffer {
        let mut buffer = EventBuffer::new();
        let row = XmlName::local("row");
        buffer.start_element(&row, &[Attribute::new("n", "1")]).unwrap();
        buffer.characters("a").unwrap();
        buffer.characters("b").unwrap();
        buffer.end_element(&row).unwrap();
        buffer
    }

    #[test]
    fn test_replay_is_repeatable() {
        let buffer = sample();
        let mut once = EventBuffer::new();
        buffer.replay(&mut once).unwrap();

        let mut thrice = EventBuffer::new();
        for _ in 0..3 {
            buffer.replay(&mut thrice).unwrap();
        }

        let expected: Vec<Event> = once.events().cloned().collect();
        let got: Vec<Event> = thrice.events().cloned().collect();
        assert_eq!(got.len(), expected.len() * 3);
        for chunk in got.chunks(expected.len()) {
            assert_eq!(chunk, expected.as_slice());
        }
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_characters_are_merged_and_text_collected() {
        let buffer = sample();
        assert_eq!(buffer.text(), "ab");
        assert!(matches!(
            buffer.events().nth(1),
            Some(Event::Characters(t)) if t == "ab"
        ));
    }

    #[test]
    fn test_clear() {
        let mut buffer = sample();
        buffer.clear();
        assert!(buffer.is_empty());
    }
}
