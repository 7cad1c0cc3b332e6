mod grow;

pub(crate) use grow::GrowList;
