mod e2e_room;
