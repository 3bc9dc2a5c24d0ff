mod profiles;
mod quests;
