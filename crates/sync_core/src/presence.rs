use shared::{
    domain::{MemberRole, UserId, UserRole},
    protocol::{Channel, ChannelMembership},
};

pub fn companion<'a>(channel: &'a Channel, viewer: &UserId) -> Option<&'a ChannelMembership> {
    channel
        .state
        .members
        .values()
        .find(|member| &member.user.id != viewer)
}

pub fn private_companion<'a>(
    channel: &'a Channel,
    viewer: &UserId,
) -> Option<&'a ChannelMembership> {
    if channel.is_group() {
        None
    } else {
        companion(channel, viewer)
    }
}

pub fn channel_display_name(channel: &Channel, viewer: &UserId) -> String {
    if channel.is_group() {
        return channel.data.name.clone();
    }
    companion(channel, viewer)
        .map(|member| member.user.name.clone())
        .unwrap_or_default()
}

pub fn channel_image(channel: &Channel, viewer: &UserId) -> Option<String> {
    if channel.is_group() {
        return channel.data.image.clone();
    }
    companion(channel, viewer).and_then(|member| member.user.image.clone())
}

pub fn formatted_gender_pronoun(pronoun: &str, role: UserRole) -> String {
    if let Some(label) = role.readable() {
        return label.to_string();
    }
    let words = pronoun_words(pronoun);
    if words.is_empty() {
        return "Actor".to_string();
    }
    format!("Actor ({})", words.join(" ").replacen(' ', "/", 1))
}

fn pronoun_words(raw: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for ch in raw.chars() {
        if !ch.is_alphanumeric() {
            prev_lower = false;
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if ch.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = ch.is_lowercase();
        current.push(ch);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
        .into_iter()
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect()
}

pub fn channel_description(channel: &Channel, viewer: &UserId) -> String {
    if channel.is_group() {
        return channel.data.description.clone();
    }
    match companion(channel, viewer) {
        Some(member) => formatted_gender_pronoun(
            member.user.custom_gender_pronoun.as_deref().unwrap_or_default(),
            member.user.role,
        ),
        None => String::new(),
    }
}

pub fn companion_readable_role(channel: &Channel, viewer: &UserId) -> Option<&'static str> {
    companion(channel, viewer).and_then(|member| member.user.role.readable())
}

pub fn is_channel_enabled_for_actors(channel: &Channel, viewer: &UserId) -> bool {
    let companion_enabled = companion(channel, viewer)
        .map(|member| member.channel_role != MemberRole::DisabledActor)
        .unwrap_or(true);
    !channel.data.unavailable_for_actors && companion_enabled
}

pub fn is_channel_enabled_for_minor(channel: &Channel, viewer: &UserId) -> bool {
    private_companion(channel, viewer)
        .map(|member| member.user.role.is_industry_professional())
        .unwrap_or(false)
}

pub fn is_companion_online(channel: &Channel, viewer: &UserId) -> bool {
    private_companion(channel, viewer)
        .map(|member| member.user.online)
        .unwrap_or(false)
}

pub fn is_input_disabled(channel: &Channel, viewer_role: UserRole) -> bool {
    viewer_role == UserRole::Actor && channel.data.unavailable_for_actors
}

#[cfg(test)]
#[path = "tests/presence_tests.rs"]
mod tests;
